//! Error handling for DQA runs.
//!
//! Two layers: `DqaError` covers whole-run structural failures that abort a run,
//! while `Rejection` describes why a single file was diverted. Rejections never
//! escape the batch pipeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::fits::FitsError;
use crate::registry::RegistryError;

#[derive(Error, Debug)]
pub enum DqaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FITS error: {0}")]
    Fits(#[from] FitsError),

    #[error("Required input file does not exist: {path}")]
    MissingInput { path: PathBuf },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Invalid UT date '{value}': expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("Unknown instrument '{name}'")]
    UnknownInstrument { name: String },

    #[error("Failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DqaError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Output {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DqaError>;

/// Reason a file failed DQA and was diverted to the holding area.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("bad header: {reason}")]
    BadHeader { reason: String },

    #[error("bad instrument: INSTRUME is '{found}'")]
    BadInstrument { found: String },

    #[error("bad date-obs")]
    BadDateObs,

    #[error("bad utc")]
    BadUtc,

    #[error("bad elaptime: {missing} needed to derive ELAPTIME")]
    BadElaptime { missing: String },

    #[error("bad frameno")]
    BadFrameno,

    #[error("bad outfile")]
    BadOutfile,

    #[error("bad identifier ({detail})")]
    BadIdentifier { detail: String },

    #[error("duplicate identifier {id}")]
    DuplicateIdentifier { id: String },

    #[error("bad date {date} in identifier {id}")]
    BadDate { id: String, date: String },

    #[error("could not write output file: {reason}")]
    WriteFailed { reason: String },
}

impl Rejection {
    pub fn bad_identifier(detail: impl Into<String>) -> Self {
        Self::BadIdentifier {
            detail: detail.into(),
        }
    }

    /// Short reason string used in the run log and rejection listings.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::BadHeader { .. } => "bad header",
            Rejection::BadInstrument { .. } => "bad instrument",
            Rejection::BadDateObs => "bad date-obs",
            Rejection::BadUtc => "bad utc",
            Rejection::BadElaptime { .. } => "bad elaptime",
            Rejection::BadFrameno => "bad frameno",
            Rejection::BadOutfile => "bad outfile",
            Rejection::BadIdentifier { .. } => "bad identifier",
            Rejection::DuplicateIdentifier { .. } => "duplicate identifier",
            Rejection::BadDate { .. } => "bad date",
            Rejection::WriteFailed { .. } => "write failed",
        }
    }
}

impl From<FitsError> for Rejection {
    fn from(err: FitsError) -> Self {
        Rejection::BadHeader {
            reason: err.to_string(),
        }
    }
}
