//! KOA DQA Library
//!
//! Data quality assessment for raw Keck Observatory instrument FITS files,
//! preparing one instrument night at a time for the Keck Observatory Archive.
//!
//! This library provides tools for:
//! - Reading and writing FITS headers and data units without altering pixel data
//! - Resolving canonical keywords through per-instrument alias tables
//! - Running ordered per-instrument header rules that validate and enrich headers
//! - Computing and validating unique archive identifiers (KOAIDs)
//! - Attributing files to scheduled observing programs
//! - Locating a night's files and writing the archive's file lists and tables

pub mod config;
pub mod constants;
pub mod error;
pub mod ext_tables;
pub mod fits;
pub mod header;
pub mod identity;
pub mod instrument;
pub mod keywords;
pub mod locate;
pub mod pipeline;
pub mod registry;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use config::DqaConfig;
pub use error::{DqaError, Rejection, Result};
pub use fits::FitsFile;
pub use header::{Header, Value};
pub use identity::{ArchiveId, IdentityValidator};
pub use instrument::{InstrumentKind, InstrumentProfile, RuleEngine, RunContext};
pub use pipeline::{BatchResult, DqaPipeline, RunDirs, RunOutcome, RunStatus};
pub use registry::{ProgramInfo, ProgramRegistry, ScheduleProgramRegistry};
