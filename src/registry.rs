//! Observing-program and telescope-schedule collaborators.
//!
//! The pipeline only sees the [`ProgramRegistry`] and [`ScheduleRegistry`]
//! traits. The shipped implementations read the schedule file written by the
//! upstream obtain step, one line per scheduled program:
//!
//! ```text
//! hstdate oa account institution principal projcode observers
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::{ENGINEERING_PROGRAM, NO_PROGRAM};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Cannot read schedule {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed schedule line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Program metadata for one observation
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramInfo {
    pub progid: String,
    pub pi: String,
    pub institution: String,
    pub title: String,
    /// Proprietary period in months; registry default applies when `None`
    pub proprietary_months: Option<i64>,
}

impl ProgramInfo {
    /// Engineering time carries no PI or institution
    pub fn engineering() -> Self {
        Self {
            progid: ENGINEERING_PROGRAM.to_string(),
            pi: NO_PROGRAM.to_string(),
            institution: NO_PROGRAM.to_string(),
            title: NO_PROGRAM.to_string(),
            proprietary_months: None,
        }
    }

    fn from_entry(entry: &ScheduleEntry) -> Self {
        Self {
            progid: entry.projcode.clone(),
            pi: entry.principal.clone(),
            institution: entry.institution.clone(),
            title: NO_PROGRAM.to_string(),
            proprietary_months: None,
        }
    }
}

/// What the registry needs to attribute one file
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramQuery {
    pub ut_date: NaiveDate,
    pub instrument: String,
    pub ut_time: Option<NaiveTime>,
    pub file: PathBuf,
    /// PROGID already present in the raw header
    pub header_progid: Option<String>,
}

pub trait ProgramRegistry {
    fn lookup(&self, query: &ProgramQuery) -> Option<ProgramInfo>;

    /// Observing assistant on duty for the night
    fn observing_assistant(&self) -> Option<String> {
        None
    }
}

/// One scheduled program for the night
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub hst_date: String,
    pub oa: String,
    pub account: String,
    pub institution: String,
    pub principal: String,
    pub projcode: String,
    pub observers: String,
}

impl ScheduleEntry {
    pub fn parse(line: &str, line_no: usize) -> Result<Self, RegistryError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            return Err(RegistryError::Malformed {
                line: line_no,
                reason: format!("expected at least 6 fields, found {}", fields.len()),
            });
        }
        let observers = if fields.len() > 6 {
            fields[6..].join(" ")
        } else {
            "None".to_string()
        };
        Ok(Self {
            hst_date: fields[0].to_string(),
            oa: fields[1].to_string(),
            account: fields[2].to_string(),
            institution: fields[3].to_string(),
            principal: fields[4].to_string(),
            projcode: fields[5].to_string(),
            observers,
        })
    }

    /// Placeholder line written when nothing is scheduled
    pub fn is_unscheduled(&self) -> bool {
        self.projcode == NO_PROGRAM
    }
}

pub trait ScheduleRegistry {
    fn entries(&self, ut_date: NaiveDate, instrument: &str) -> Result<Vec<ScheduleEntry>, RegistryError>;
}

/// Schedule read from a file on disk
#[derive(Debug, Clone)]
pub struct ScheduleFile {
    path: PathBuf,
}

impl ScheduleFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScheduleRegistry for ScheduleFile {
    fn entries(&self, _ut_date: NaiveDate, instrument: &str) -> Result<Vec<ScheduleEntry>, RegistryError> {
        let content = fs::read_to_string(&self.path).map_err(|source| RegistryError::Io {
            path: self.path.clone(),
            source,
        })?;
        let entries = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| ScheduleEntry::parse(line, i + 1))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "Read {} schedule entries for {} from {}",
            entries.len(),
            instrument,
            self.path.display()
        );
        Ok(entries)
    }
}

/// Program attribution derived from the night's schedule
#[derive(Debug, Clone, Default)]
pub struct ScheduleProgramRegistry {
    entries: Vec<ScheduleEntry>,
    split_time: Option<NaiveTime>,
    use_header_program: bool,
    default_propint: Option<i64>,
}

impl ScheduleProgramRegistry {
    pub fn new(entries: Vec<ScheduleEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    /// Load from a schedule collaborator. A failing collaborator leaves the
    /// registry empty so the run continues without program data.
    pub fn from_schedule(schedule: &dyn ScheduleRegistry, ut_date: NaiveDate, instrument: &str) -> Self {
        match schedule.entries(ut_date, instrument) {
            Ok(entries) => {
                info!("{} scheduled program(s) for {} {}", entries.len(), instrument, ut_date);
                Self::new(entries)
            }
            Err(e) => {
                warn!("Schedule lookup failed, continuing without program data: {}", e);
                Self::default()
            }
        }
    }

    pub fn with_split_time(mut self, split_time: Option<NaiveTime>) -> Self {
        self.split_time = split_time;
        self
    }

    pub fn with_header_program(mut self, use_header_program: bool) -> Self {
        self.use_header_program = use_header_program;
        self
    }

    pub fn with_default_propint(mut self, months: Option<i64>) -> Self {
        self.default_propint = months;
        self
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    fn scheduled(&self) -> impl Iterator<Item = &ScheduleEntry> {
        self.entries.iter().filter(|e| !e.is_unscheduled())
    }

    fn attribute(&self, query: &ProgramQuery) -> Option<ProgramInfo> {
        if self.use_header_program {
            if let Some(progid) = query
                .header_progid
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty() && *p != NO_PROGRAM)
            {
                let info = self
                    .scheduled()
                    .find(|e| e.projcode == progid)
                    .map(ProgramInfo::from_entry)
                    .unwrap_or_else(|| ProgramInfo {
                        progid: progid.to_string(),
                        pi: NO_PROGRAM.to_string(),
                        institution: NO_PROGRAM.to_string(),
                        title: NO_PROGRAM.to_string(),
                        proprietary_months: None,
                    });
                return Some(info);
            }
        }

        let path = query.file.to_string_lossy();
        if path.contains("eng") {
            return Some(ProgramInfo::engineering());
        }

        let components: Vec<String> = query
            .file
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if let Some(entry) = self
            .scheduled()
            .find(|e| components.iter().any(|c| *c == e.account))
        {
            return Some(ProgramInfo::from_entry(entry));
        }

        let scheduled: Vec<&ScheduleEntry> = self.scheduled().collect();
        match scheduled.as_slice() {
            [] => None,
            [only] => Some(ProgramInfo::from_entry(only)),
            [first, second, ..] => {
                let (split, ut) = (self.split_time?, query.ut_time?);
                let entry = if ut < split { first } else { second };
                Some(ProgramInfo::from_entry(entry))
            }
        }
    }
}

impl ProgramRegistry for ScheduleProgramRegistry {
    fn lookup(&self, query: &ProgramQuery) -> Option<ProgramInfo> {
        let info = self.attribute(query).map(|mut info| {
            if info.proprietary_months.is_none() {
                info.proprietary_months = self.default_propint;
            }
            info
        });
        match &info {
            Some(i) => debug!("{} attributed to {}", query.file.display(), i.progid),
            None => debug!("No program found for {}", query.file.display()),
        }
        info
    }

    fn observing_assistant(&self) -> Option<String> {
        self.entries.first().map(|e| e.oa.clone())
    }
}
