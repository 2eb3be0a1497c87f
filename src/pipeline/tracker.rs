//! Run-tracking records updated when a batch completes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DqaError, Result};

/// External bookkeeping for one instrument night
pub trait RunTracker {
    /// Set one tracking field for the run
    fn update(&mut self, instrument: &str, ut_date: NaiveDate, field: &str, value: &str) -> Result<()>;

    /// Flag a `SEMESTER_PROGID` as needing a PI notification
    fn notify_program(&mut self, instrument: &str, ut_date: NaiveDate, semid: &str) -> Result<()>;
}

/// Tracker that ignores every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTracker;

impl RunTracker for NullTracker {
    fn update(&mut self, _instrument: &str, _ut_date: NaiveDate, _field: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    fn notify_program(&mut self, _instrument: &str, _ut_date: NaiveDate, _semid: &str) -> Result<()> {
        Ok(())
    }
}

/// On-disk form of one run's tracking record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub instrument: String,
    pub ut_date: Option<NaiveDate>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub notified: Vec<String>,
}

/// Keeps the tracking record in a JSON status file, rewritten on every change
#[derive(Debug, Clone)]
pub struct StatusFileTracker {
    path: PathBuf,
}

impl StatusFileTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current record; a missing file reads as an empty record
    pub fn load(&self) -> Result<RunRecord> {
        if !self.path.exists() {
            return Ok(RunRecord::default());
        }
        let content = fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| {
            DqaError::configuration(format!(
                "Corrupt status file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn modify(&self, instrument: &str, ut_date: NaiveDate, change: impl FnOnce(&mut RunRecord)) -> Result<()> {
        let mut record = self.load()?;
        record.instrument = instrument.to_string();
        record.ut_date = Some(ut_date);
        change(&mut record);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| DqaError::configuration(format!("Cannot serialize run record: {}", e)))?;
        fs::write(&self.path, json).map_err(|e| DqaError::output(&self.path, e))
    }
}

impl RunTracker for StatusFileTracker {
    fn update(&mut self, instrument: &str, ut_date: NaiveDate, field: &str, value: &str) -> Result<()> {
        debug!("Tracking {} {}: {} = {}", instrument, ut_date, field, value);
        self.modify(instrument, ut_date, |record| {
            record.fields.insert(field.to_string(), value.to_string());
        })
    }

    fn notify_program(&mut self, instrument: &str, ut_date: NaiveDate, semid: &str) -> Result<()> {
        info!("Flagging {} for PI notification", semid);
        self.modify(instrument, ut_date, |record| {
            if !record.notified.iter().any(|s| s == semid) {
                record.notified.push(semid.to_string());
            }
        })
    }
}
