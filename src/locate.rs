//! File locate step.
//!
//! Finds the FITS files an instrument wrote during the 24 hours ending at the
//! night's end-of-night cutoff, copies them into the stage directory (keeping
//! their absolute path below it) and writes the locate list consumed by the
//! DQA run.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::constants::{FITS_SUFFIX, LOCATE_EXCLUSIONS};
use crate::error::{DqaError, Result};
use crate::fits::FitsFile;
use crate::instrument::{InstrumentKind, InstrumentProfile};
use crate::pipeline::RunDirs;

/// DEIMOS focus-camera configuration image referenced by science frames
const FCS_IMAGE_KEYWORD: &str = "FCSIMGFI";

/// Outcome of one locate run
#[derive(Debug, Clone, Default)]
pub struct LocateReport {
    /// Search directories that exist
    pub searched: Vec<PathBuf>,
    /// Staged copies, in list order
    pub files: Vec<PathBuf>,
    pub list: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FileLocator {
    kind: InstrumentKind,
    search_dirs: Vec<PathBuf>,
    end_of_night: NaiveTime,
}

impl FileLocator {
    pub fn new(profile: &InstrumentProfile) -> Self {
        Self {
            kind: profile.kind,
            search_dirs: profile.search_dirs.clone(),
            end_of_night: profile.end_of_night,
        }
    }

    /// Replace the instrument's default search directories
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    /// Modification-time window `(start, end]` for a UT date
    pub fn window(&self, ut_date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = ut_date.and_time(self.end_of_night).and_utc();
        (end - Duration::days(1), end)
    }

    /// Candidate files under the existing search directories
    pub fn find(&self, ut_date: NaiveDate) -> Vec<PathBuf> {
        let (start, end) = self.window(ut_date);
        debug!("Locating files modified in ({}, {}]", start, end);

        let mut found = Vec::new();
        for dir in self.search_dirs.iter().filter(|d| d.is_dir()) {
            for entry in WalkDir::new(dir)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !entry.file_type().is_file() || !has_fits_suffix(path) {
                    continue;
                }
                let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
                    Some(time) => DateTime::<Utc>::from(time),
                    None => continue,
                };
                if modified > start && modified <= end {
                    found.push(path.to_path_buf());
                }
            }
        }
        found
    }

    /// Find, filter and stage the night's files, then write the locate list
    pub fn locate(&self, ut_date: NaiveDate, dirs: &RunDirs) -> Result<LocateReport> {
        fs::create_dir_all(&dirs.stage).map_err(|e| DqaError::output(&dirs.stage, e))?;
        let list = dirs.locate_list(self.kind);

        let searched: Vec<PathBuf> = self
            .search_dirs
            .iter()
            .filter(|d| d.is_dir())
            .cloned()
            .collect();
        if searched.is_empty() {
            warn!("Did not find any {} data directories", self.kind);
        }

        info!("Looking for {} FITS files for {}", self.kind, ut_date);
        let mut staged = Vec::new();
        let mut fcs_images: Vec<String> = Vec::new();
        for path in self.find(ut_date) {
            if is_excluded(&path) {
                debug!("Skipping excluded path {}", path.display());
                continue;
            }
            let target = staged_path(&dirs.stage, &path);
            info!("Copying {} to {}", path.display(), target.display());
            copy_file(&path, &target)?;
            staged.push(target);

            if self.kind == InstrumentKind::Deimos {
                if let Some(fcs) = fcs_image(&path).filter(|f| !fcs_images.contains(f)) {
                    fcs_images.push(fcs.clone());
                    let source = if fcs.contains("/s/") {
                        PathBuf::from(&fcs)
                    } else {
                        PathBuf::from(format!("/s{}", fcs))
                    };
                    let target = staged_path(&dirs.stage, &source);
                    match copy_file(&source, &target) {
                        Ok(()) => staged.push(target),
                        Err(e) => warn!("Could not stage FCS image {}: {}", source.display(), e),
                    }
                }
            }
        }

        let listing: String = staged.iter().map(|p| format!("{}\n", p.display())).collect();
        fs::write(&list, listing).map_err(|e| DqaError::output(&list, e))?;
        info!("{}: locate successful - {} files found", self.kind, staged.len());

        Ok(LocateReport {
            searched,
            files: staged,
            list,
        })
    }
}

fn has_fits_suffix(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(FITS_SUFFIX))
}

/// Paths containing any of the exclusion substrings are never staged
pub fn is_excluded(path: &Path) -> bool {
    let text = path.to_string_lossy();
    LOCATE_EXCLUSIONS.iter().any(|x| text.contains(x))
}

/// `<stage><absolute source path>`
pub fn staged_path(stage: &Path, source: &Path) -> PathBuf {
    let relative = source.strip_prefix("/").unwrap_or(source);
    stage.join(relative)
}

/// Copy unless the destination already exists
fn copy_file(source: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        return Ok(());
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| DqaError::output(parent, e))?;
    }
    fs::copy(source, target).map_err(|e| DqaError::output(target, e))?;
    Ok(())
}

fn fcs_image(path: &Path) -> Option<String> {
    let header = FitsFile::primary_header(path).ok()?;
    let value = header.get(FCS_IMAGE_KEYWORD)?.to_string();
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
