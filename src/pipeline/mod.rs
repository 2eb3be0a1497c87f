//! Batch DQA pipeline.
//!
//! Processes the located files for one instrument night strictly in input
//! order. Each file is loaded, attributed to a program, run through the
//! instrument's rule engine, checked by the identity validator and written to
//! `lev0/<KOAID>`. A file that fails any stage is copied to the `udf` holding
//! directory and the batch moves on; only missing run inputs and unwritable
//! run outputs abort a run.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use indicatif::ProgressBar;
use regex::Regex;
use tracing::{Span, debug, error, info, info_span, warn};

use crate::constants::{self, NON_NOTIFY_PROGRAMS, tracking};
use crate::error::{DqaError, Rejection, Result};
use crate::ext_tables;
use crate::fits::FitsFile;
use crate::identity::{ArchiveId, IdentityValidator, parse_header_time};
use crate::instrument::{ExtraMeta, InstrumentKind, InstrumentProfile, RuleEngine, RunContext};
use crate::keywords::Keyword;
use crate::locate::staged_path;
use crate::registry::{ProgramQuery, ProgramRegistry};

pub mod preview;
pub mod tracker;

pub use preview::{GrayscalePreview, NoPreview, PreviewRenderer};
pub use tracker::{NullTracker, RunRecord, RunTracker, StatusFileTracker};

/// Storage volume number in an original file path, e.g. `/s/sdata701/...`
static VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/sdata(.*?)/").expect("volume pattern is valid"));

// =============================================================================
// Directory Layout
// =============================================================================

/// Directories used by one instrument night
#[derive(Debug, Clone, PartialEq)]
pub struct RunDirs {
    /// `<root>/<INSTR>/<YYYYMMDD>`
    pub process: PathBuf,
    pub stage: PathBuf,
    pub lev0: PathBuf,
    pub anc: PathBuf,
    /// Holding area for files that failed DQA
    pub udf: PathBuf,
}

impl RunDirs {
    pub fn new(root: &Path, stage_root: &Path, kind: InstrumentKind, ut_date: NaiveDate) -> Self {
        let ymd = ut_date.format("%Y%m%d").to_string();
        let process = root.join(kind.name()).join(&ymd);
        let anc = process.join("anc");
        Self {
            stage: stage_root.join(kind.name()).join(&ymd),
            lev0: process.join("lev0"),
            udf: anc.join("udf"),
            anc,
            process,
        }
    }

    pub fn create(&self) -> Result<()> {
        for dir in [&self.process, &self.stage, &self.lev0, &self.anc, &self.udf] {
            fs::create_dir_all(dir).map_err(|e| DqaError::output(dir, e))?;
        }
        Ok(())
    }

    pub fn locate_list(&self, kind: InstrumentKind) -> PathBuf {
        self.stage.join(constants::locate_list_name(kind.name()))
    }

    pub fn dqa_list(&self, kind: InstrumentKind) -> PathBuf {
        self.stage.join(constants::dqa_list_name(kind.name()))
    }

    pub fn schedule_file(&self, kind: InstrumentKind) -> PathBuf {
        self.stage.join(constants::schedule_file_name(kind.name()))
    }

    pub fn file_table(&self, ut_date: NaiveDate) -> PathBuf {
        self.lev0.join(format!("{}.filelist.table", ut_date.format("%Y%m%d")))
    }

    pub fn status_file(&self, kind: InstrumentKind) -> PathBuf {
        self.process.join(format!("dep_status{}.json", kind.name()))
    }

    pub fn log_file(&self, kind: InstrumentKind, ut_date: NaiveDate) -> PathBuf {
        let ymd = ut_date.format("%Y%m%d").to_string();
        self.process.join(constants::log_file_name(kind.name(), &ymd))
    }
}

// =============================================================================
// Batch Results
// =============================================================================

/// One file that passed DQA
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedFile {
    /// Path as listed by the locate step
    pub source: PathBuf,
    pub koaid: ArchiveId,
    /// Written `lev0` copy
    pub output: PathBuf,
    /// `SEMESTER_PROGID`
    pub semid: String,
    pub pi: String,
    pub science: bool,
}

impl AcceptedFile {
    pub fn original_name(&self) -> String {
        file_name(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedFile {
    pub path: PathBuf,
    pub rejection: Rejection,
}

/// Accumulated outcome of one batch; aggregates are first-seen ordered and unique
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub accepted: Vec<AcceptedFile>,
    pub rejected: Vec<RejectedFile>,
    pub semids: Vec<String>,
    pub pis: Vec<String>,
    pub volumes: Vec<String>,
    pub science_files: usize,
    pub extra_meta: BTreeMap<String, ExtraMeta>,
}

impl BatchResult {
    fn record(&mut self, file: AcceptedFile, extra: ExtraMeta) {
        push_unique(&mut self.semids, &file.semid);
        push_unique(&mut self.pis, &file.pi);
        if let Some(volume) = storage_volume(&file.source) {
            push_unique(&mut self.volumes, &volume);
        }
        if file.science {
            self.science_files += 1;
        }
        self.extra_meta.insert(file.koaid.to_string(), extra);
        self.accepted.push(file);
    }

    fn reject(&mut self, path: &Path, rejection: Rejection) {
        self.rejected.push(RejectedFile {
            path: path.to_path_buf(),
            rejection,
        });
    }

    pub fn accepted_paths(&self) -> Vec<&Path> {
        self.accepted.iter().map(|a| a.source.as_path()).collect()
    }

    /// Identifiers parallel to [`accepted_paths`](Self::accepted_paths)
    pub fn identifiers(&self) -> Vec<String> {
        self.accepted.iter().map(|a| a.koaid.to_string()).collect()
    }

    /// Tracker form of the PI list, e.g. `Smith/Jones`
    pub fn pi_list(&self) -> String {
        slash_list(&self.pis)
    }

    /// Tracker form of the volume list, e.g. `701/702`
    pub fn volume_list(&self) -> String {
        slash_list(&self.volumes)
    }

    /// Unique program ids eligible for a PI notification
    pub fn notifiable_semids(&self) -> Vec<&str> {
        self.semids
            .iter()
            .filter(|semid| {
                let mut parts = semid.splitn(2, '_');
                let semester = parts.next().unwrap_or_default();
                let progid = parts.next().unwrap_or_default();
                !semester.is_empty() && !NON_NOTIFY_PROGRAMS.iter().any(|p| p.eq_ignore_ascii_case(progid))
            })
            .map(String::as_str)
            .collect()
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|i| i == item) {
        list.push(item.to_string());
    }
}

fn slash_list(items: &[String]) -> String {
    if items.is_empty() {
        constants::NO_PROGRAM.to_string()
    } else {
        items.join("/")
    }
}

/// Volume number parsed from a path such as `/s/sdata701/esi3/...`
pub fn storage_volume(path: &Path) -> Option<String> {
    VOLUME
        .captures(&path.to_string_lossy())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Final run state. There is no partial-success status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success(usize),
    SuccessZero,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success(n) => write!(f, "success ({} files)", n),
            RunStatus::SuccessZero => f.write_str("success (0 files)"),
        }
    }
}

/// Everything a caller needs to report on a finished run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub candidates: usize,
    pub batch: BatchResult,
    pub elapsed: Duration,
}

// =============================================================================
// Pipeline
// =============================================================================

pub struct DqaPipeline {
    engine: RuleEngine,
    dirs: RunDirs,
    registry: Box<dyn ProgramRegistry>,
    tracker: Box<dyn RunTracker>,
    renderer: Box<dyn PreviewRenderer>,
    progress: Option<ProgressBar>,
    tpx: bool,
    dev: bool,
    span: Span,
}

impl DqaPipeline {
    pub fn new(
        profile: InstrumentProfile,
        context: RunContext,
        dirs: RunDirs,
        registry: Box<dyn ProgramRegistry>,
    ) -> Self {
        let span = info_span!("dqa", instrument = %profile.kind, ut_date = %context.ut_date);
        let context = match registry.observing_assistant() {
            Some(oa) => context.with_oa(oa),
            None => context,
        };
        Self {
            engine: RuleEngine::new(profile, context, span.clone()),
            dirs,
            registry,
            tracker: Box::new(NullTracker),
            renderer: Box::new(NoPreview),
            progress: None,
            tpx: false,
            dev: false,
            span,
        }
    }

    pub fn with_tracker(mut self, tracker: Box<dyn RunTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn PreviewRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Update run tracking when the batch completes
    pub fn with_tpx(mut self, tpx: bool) -> Self {
        self.tpx = tpx;
        self
    }

    /// Development runs never send PI notifications
    pub fn with_dev(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    pub fn dirs(&self) -> &RunDirs {
        &self.dirs
    }

    fn kind(&self) -> InstrumentKind {
        self.engine.profile().kind
    }

    fn ut_date(&self) -> NaiveDate {
        self.engine.context().ut_date
    }

    /// Read the locate list, process every file and write the run outputs
    pub fn run(&mut self) -> Result<RunOutcome> {
        let span = self.span.clone();
        let _entered = span.enter();
        let started = Instant::now();
        info!("DQA started for {} {}", self.kind(), self.ut_date());

        let locate_list = self.dirs.locate_list(self.kind());
        if !locate_list.exists() {
            return Err(DqaError::MissingInput { path: locate_list });
        }
        let files = read_file_list(&locate_list)?;

        let batch = if files.is_empty() {
            BatchResult::default()
        } else {
            self.process(&files)?
        };
        let status = self.finalize(&batch)?;
        info!("DQA finished for {}: {}", self.kind(), status);

        Ok(RunOutcome {
            status,
            candidates: files.len(),
            batch,
            elapsed: started.elapsed(),
        })
    }

    /// Run DQA over `files` in order. Rejected files are copied to `udf`.
    pub fn process(&mut self, files: &[PathBuf]) -> Result<BatchResult> {
        self.dirs.create()?;
        let profile = self.engine.profile();
        let mut validator = IdentityValidator::new(self.ut_date(), profile.end_of_night);
        let mut batch = BatchResult::default();
        let mut diverted = HashSet::new();

        info!("Processing {} files", files.len());
        for path in files {
            debug!("Input file is {}", path.display());
            match self.process_file(&mut validator, path) {
                Ok((accepted, extra)) => {
                    info!("{} -> {}", path.display(), accepted.koaid);
                    batch.record(accepted, extra);
                }
                Err(rejection) => {
                    warn!(
                        "{} failed DQA ({}). Copying to {}",
                        path.display(),
                        rejection,
                        self.dirs.udf.display()
                    );
                    self.divert(path, &mut diverted);
                    batch.reject(path, rejection);
                }
            }
            if let Some(pb) = &self.progress {
                pb.set_message(file_name(path));
                pb.inc(1);
            }
        }

        if let Some(pb) = &self.progress {
            pb.finish_with_message(format!("{} accepted", batch.accepted.len()));
        }
        Ok(batch)
    }

    fn process_file(
        &self,
        validator: &mut IdentityValidator,
        path: &Path,
    ) -> std::result::Result<(AcceptedFile, ExtraMeta), Rejection> {
        let mut file = FitsFile::open(path)?;

        let query = self.program_query(&file, path);
        let program = self.registry.lookup(&query);

        let extra = self.engine.run_checks(&mut file, program.as_ref())?;

        let header = file.header();
        let koaid = validator.check(header.get(Keyword::Koaid.name()).and_then(|v| v.as_str()))?;

        let output = self.dirs.lev0.join(koaid.to_string());
        file.write(&output).map_err(|e| Rejection::WriteFailed {
            reason: e.to_string(),
        })?;

        if let Err(e) = self.renderer.render(&file, &output, &self.dirs.lev0) {
            warn!("Preview for {} failed: {}", koaid, e);
        }

        validator.record(&koaid);

        let text = |kw: Keyword| {
            header
                .get(kw.name())
                .map(|v| v.to_string())
                .unwrap_or_default()
        };
        let accepted = AcceptedFile {
            source: path.to_path_buf(),
            semid: format!("{}_{}", text(Keyword::Semester), text(Keyword::Progid)),
            pi: text(Keyword::Progpi),
            science: text(Keyword::Koaimtyp) == "object",
            koaid,
            output,
        };
        Ok((accepted, extra))
    }

    fn program_query(&self, file: &FitsFile, path: &Path) -> ProgramQuery {
        let header = file.header();
        let profile = self.engine.profile();
        let utc = profile
            .aliases
            .native(Keyword::Utc)
            .and_then(|native| header.get(native))
            .or_else(|| header.get(Keyword::Utc.name()));
        ProgramQuery {
            ut_date: self.ut_date(),
            instrument: profile.kind.name().to_string(),
            ut_time: utc.and_then(|v| v.as_str()).and_then(parse_header_time),
            file: path.to_path_buf(),
            header_progid: header.get(Keyword::Progid.name()).map(|v| v.to_string()),
        }
    }

    /// Copy a rejected file to `udf/<name>`. A second reject with the same
    /// name in one batch keeps its full source path under `udf` instead.
    fn divert(&self, path: &Path, diverted: &mut HashSet<PathBuf>) {
        let mut target = self.dirs.udf.join(file_name(path));
        if !diverted.insert(target.clone()) {
            let nested = staged_path(&self.dirs.udf, path);
            warn!(
                "{} already holds a rejected {}; copying {} to {}",
                self.dirs.udf.display(),
                file_name(path),
                path.display(),
                nested.display()
            );
            if let Some(parent) = nested.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    error!("Could not create {}: {}", parent.display(), e);
                    return;
                }
            }
            diverted.insert(nested.clone());
            target = nested;
        }
        if let Err(e) = fs::copy(path, &target) {
            error!("Could not copy {} to {}: {}", path.display(), target.display(), e);
        }
    }

    /// Write the run outputs for a finished batch and update run tracking
    pub fn finalize(&mut self, batch: &BatchResult) -> Result<RunStatus> {
        self.dirs.create()?;
        let dqa_list = self.dirs.dqa_list(self.kind());

        if batch.accepted.is_empty() {
            info!("0 files output from DQA process");
            fs::write(&dqa_list, "").map_err(|e| DqaError::output(&dqa_list, e))?;
            if self.tpx {
                let stamp = Utc::now().format(tracking::TIME_FORMAT).to_string();
                self.track(tracking::ARCHIVE_STATUS, tracking::DONE);
                self.track(tracking::ARCHIVE_TIME, &stamp);
            }
            return Ok(RunStatus::SuccessZero);
        }

        let count = batch.accepted.len();
        info!("{} files passed DQA", count);
        let listing: String = batch
            .accepted
            .iter()
            .map(|a| format!("{}\n", a.source.display()))
            .collect();
        fs::write(&dqa_list, listing).map_err(|e| DqaError::output(&dqa_list, e))?;

        let table_path = self.dirs.file_table(self.ut_date());
        fs::write(&table_path, file_table(batch)).map_err(|e| DqaError::output(&table_path, e))?;

        let tables = ext_tables::write_extension_tables(&self.dirs.lev0)?;
        debug!("Wrote {} extension tables", tables.len());

        if self.tpx {
            info!("Updating run tracking records");
            self.track(tracking::FILES_ARCHIVED, &count.to_string());
            self.track(tracking::PI_LIST, &batch.pi_list());
            self.track(tracking::VOLUMES, &batch.volume_list());
            self.track(tracking::SCIENCE_FILES, &batch.science_files.to_string());
        }

        if self.tpx && !self.dev {
            let (kind, date) = (self.kind(), self.ut_date());
            for semid in batch.notifiable_semids() {
                if let Err(e) = self.tracker.notify_program(kind.name(), date, semid) {
                    error!("PI notification for {} failed: {}", semid, e);
                }
            }
        }

        Ok(RunStatus::Success(count))
    }

    fn track(&mut self, field: &str, value: &str) {
        let (kind, date) = (self.kind(), self.ut_date());
        if let Err(e) = self.tracker.update(kind.name(), date, field, value) {
            error!("Run tracking update {} failed: {}", field, e);
        }
    }
}

/// `<original> <routed KOAID>` per accepted file plus a total line
pub fn file_table(batch: &BatchResult) -> String {
    let mut out: String = batch
        .accepted
        .iter()
        .map(|a| format!("{} {}\n", a.original_name(), a.koaid.routed_name()))
        .collect();
    out.push_str(&format!("    {} Total FITS files\n", batch.accepted.len()));
    out
}

/// Newline-delimited path list; blank lines are ignored
pub fn read_file_list(path: &Path) -> Result<Vec<PathBuf>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect())
}

#[cfg(test)]
mod tests;
