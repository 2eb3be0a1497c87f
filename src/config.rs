//! Configuration management and validation.
//!
//! Settings are layered: built-in defaults, then an optional TOML file
//! (`~/.config/koa-dqa/config.toml` unless a path is given), then command-line
//! overrides applied by the CLI. [`DqaConfig::validate`] runs last.
//!
//! ```toml
//! [paths]
//! root = "/koadata"
//! stage = "/koadata/stage"
//!
//! [runtime]
//! dev = false
//!
//! [misc]
//! use_header_program = false
//! split_time = "10:30"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::DEFAULT_PROPINT;
use crate::error::{DqaError, Result};
use crate::instrument::InstrumentKind;
use crate::pipeline::RunDirs;

/// Directory layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the per-night process directories
    pub root: PathBuf,

    /// Root of the stage area; `<root>/stage` when unset
    pub stage: Option<PathBuf>,

    /// Schedule file; `dep_obtain<INSTR>.txt` in the stage directory when unset
    pub schedule: Option<PathBuf>,

    /// Replaces the instrument's built-in search directories
    pub search_dirs: Option<Vec<PathBuf>>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/koadata"),
            stage: None,
            schedule: None,
            search_dirs: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Development run: no PI notifications are sent
    pub dev: bool,

    /// Update run tracking records
    pub tpx: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiscConfig {
    /// Trust a PROGID already present in the raw header
    pub use_header_program: bool,

    /// UT time (`HH:MM` or `HH:MM:SS`) splitting a two-program night
    pub split_time: Option<String>,

    /// Proprietary period in months when the schedule has none
    pub default_propint: i64,
}

impl Default for MiscConfig {
    fn default() -> Self {
        Self {
            use_header_program: false,
            split_time: None,
            default_propint: DEFAULT_PROPINT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Render a grayscale preview next to every output file
    pub write_previews: bool,

    /// Run tracking status file; `dep_status<INSTR>.json` in the process directory when unset
    pub status_file: Option<PathBuf>,
}

/// Complete run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DqaConfig {
    pub paths: PathsConfig,
    pub runtime: RuntimeConfig,
    pub misc: MiscConfig,
    pub output: OutputConfig,
}

impl DqaConfig {
    /// `<config dir>/koa-dqa/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DqaError::configuration("Could not determine user config directory"))?;
        Ok(config_dir.join("koa-dqa").join("config.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DqaError::configuration(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            DqaError::configuration(format!("Failed to parse config file '{}': {}", path.display(), e))
        })
    }

    /// Defaults overlaid by `config_file` when given
    pub fn load_layered(config_file: Option<&Path>) -> Result<Self> {
        match config_file {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                Self::from_file(path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.paths.root.as_os_str().is_empty() {
            return Err(DqaError::configuration("paths.root must not be empty"));
        }
        if let Some(text) = &self.misc.split_time {
            parse_split_time(text).ok_or_else(|| {
                DqaError::configuration(format!(
                    "misc.split_time '{}' is not a UT time (HH:MM or HH:MM:SS)",
                    text
                ))
            })?;
        }
        if self.misc.default_propint < 0 {
            return Err(DqaError::configuration(format!(
                "misc.default_propint must not be negative, got {}",
                self.misc.default_propint
            )));
        }
        Ok(())
    }

    pub fn split_time(&self) -> Option<NaiveTime> {
        self.misc.split_time.as_deref().and_then(parse_split_time)
    }

    pub fn stage_root(&self) -> PathBuf {
        self.paths
            .stage
            .clone()
            .unwrap_or_else(|| self.paths.root.join("stage"))
    }

    pub fn run_dirs(&self, kind: InstrumentKind, ut_date: NaiveDate) -> RunDirs {
        RunDirs::new(&self.paths.root, &self.stage_root(), kind, ut_date)
    }

    pub fn schedule_path(&self, dirs: &RunDirs, kind: InstrumentKind) -> PathBuf {
        self.paths
            .schedule
            .clone()
            .unwrap_or_else(|| dirs.schedule_file(kind))
    }

    pub fn status_path(&self, dirs: &RunDirs, kind: InstrumentKind) -> PathBuf {
        self.output
            .status_file
            .clone()
            .unwrap_or_else(|| dirs.status_file(kind))
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.paths.root = root.into();
        self
    }

    pub fn with_stage(mut self, stage: impl Into<PathBuf>) -> Self {
        self.paths.stage = Some(stage.into());
        self
    }

    pub fn with_schedule(mut self, schedule: impl Into<PathBuf>) -> Self {
        self.paths.schedule = Some(schedule.into());
        self
    }

    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.paths.search_dirs = Some(dirs);
        self
    }

    pub fn with_dev(mut self, dev: bool) -> Self {
        self.runtime.dev = dev;
        self
    }

    pub fn with_tpx(mut self, tpx: bool) -> Self {
        self.runtime.tpx = tpx;
        self
    }

    pub fn with_header_program(mut self, use_header_program: bool) -> Self {
        self.misc.use_header_program = use_header_program;
        self
    }

    pub fn with_split_time(mut self, split_time: impl Into<String>) -> Self {
        self.misc.split_time = Some(split_time.into());
        self
    }

    pub fn with_previews(mut self, write_previews: bool) -> Self {
        self.output.write_previews = write_previews;
        self
    }
}

fn parse_split_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}
