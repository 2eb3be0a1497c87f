//! Rule vocabulary shared by every instrument and the state a rule operates on.

use std::collections::BTreeMap;

use super::{InstrumentProfile, RunContext};
use crate::error::Rejection;
use crate::keywords::KeywordResolver;
use crate::registry::ProgramInfo;

/// Per-file metadata that is archived alongside, not inside, the header
pub type ExtraMeta = BTreeMap<String, String>;

/// One derivation step. Instruments list these in the order they must run;
/// later steps read keywords written by earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    DqaDate,
    DqaVersion,
    DatLevel,
    Instrument,
    DateObs,
    Utc,
    Elaptime,
    ImageType,
    ArchiveId,
    FrameNumber,
    OriginalName,
    Semester,
    ProgramInfo,
    ProprietaryPeriod,
    ImageStats,
    Weather,
    ObservingAssistant,
    SaturatedPixels,
    Wavelengths,
    SlitDims,
    SpatialScale,
    DispersionScale,
    SpectralResolution,
    IsAo,
    Dispersion,
    SlitValues,
    GainReadNoise,
    DispersionMode,
    CameraMode,
    InstrumentName,
}

/// Everything a rule may read or write for the file being processed
pub struct Step<'a> {
    pub kw: KeywordResolver<'a>,
    pub pixels: Option<&'a [f64]>,
    pub program: Option<&'a ProgramInfo>,
    pub context: &'a RunContext,
    pub profile: &'a InstrumentProfile,
    pub extra: &'a mut ExtraMeta,
}

pub type StepFn = fn(&mut Step<'_>) -> Result<(), Rejection>;

/// Instrument override table; `None` falls through to the shared rule
pub type OverrideTable = fn(Rule) -> Option<StepFn>;

/// KOAID prefix derivation for one instrument
pub type PrefixFn = fn(&KeywordResolver<'_>) -> Option<&'static str>;

pub(super) const BASE_SEQUENCE: &[Rule] = &[
    Rule::DqaDate,
    Rule::DqaVersion,
    Rule::DatLevel,
    Rule::Instrument,
    Rule::DateObs,
    Rule::Utc,
    Rule::ImageType,
    Rule::ArchiveId,
    Rule::FrameNumber,
    Rule::OriginalName,
    Rule::Semester,
    Rule::ProgramInfo,
    Rule::ProprietaryPeriod,
    Rule::ImageStats,
    Rule::Weather,
    Rule::ObservingAssistant,
    Rule::SaturatedPixels,
];
