//! Instrument rule engine.
//!
//! Each supported instrument is a closed [`InstrumentKind`] variant described
//! by an [`InstrumentProfile`]: keyword aliases, search directories, the
//! end-of-night cutoff, a saturation level, the ordered rule sequence and an
//! override table. [`RuleEngine`] interprets the sequence, consulting the
//! instrument's overrides before the shared rule implementations in
//! [`base`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{Span, debug, warn};

use crate::constants::{DEFAULT_END_OF_NIGHT, DEFAULT_SATURATION, DQA_VERSION};
use crate::error::{DqaError, Rejection};
use crate::fits::FitsFile;
use crate::keywords::{AliasTable, KeywordResolver};
use crate::registry::ProgramInfo;

pub mod base;
pub mod esi;
pub mod generic;
pub mod nires;
pub mod nirspec;
pub mod rules;

#[cfg(test)]
mod tests;

pub use rules::{ExtraMeta, OverrideTable, PrefixFn, Rule, Step, StepFn};

/// Supported instruments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    Deimos,
    Esi,
    Nires,
    Nirspec,
    Osiris,
}

impl InstrumentKind {
    pub const ALL: [InstrumentKind; 5] = [
        InstrumentKind::Deimos,
        InstrumentKind::Esi,
        InstrumentKind::Nires,
        InstrumentKind::Nirspec,
        InstrumentKind::Osiris,
    ];

    /// Upper-case instrument name as used in file names and INSTRUME
    pub fn name(self) -> &'static str {
        match self {
            InstrumentKind::Deimos => "DEIMOS",
            InstrumentKind::Esi => "ESI",
            InstrumentKind::Nires => "NIRES",
            InstrumentKind::Nirspec => "NIRSPEC",
            InstrumentKind::Osiris => "OSIRIS",
        }
    }

    /// INSTRUME values accepted for this instrument
    pub fn instrume_tokens(self) -> &'static [&'static str] {
        match self {
            InstrumentKind::Deimos => &["DEIMOS"],
            InstrumentKind::Esi => &["ESI"],
            InstrumentKind::Nires => &["NIRES"],
            InstrumentKind::Nirspec => &["NIRSPEC", "NIRSPAO"],
            InstrumentKind::Osiris => &["OSIRIS"],
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InstrumentKind {
    type Err = DqaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == upper)
            .ok_or(DqaError::UnknownInstrument {
                name: s.to_string(),
            })
    }
}

/// Saturation threshold in ADU
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Saturation {
    Fixed(f64),
    /// Scaled by the frame's COADDS
    PerCoadd(f64),
}

/// Static per-instrument configuration, read-only for the whole run
#[derive(Debug, Clone)]
pub struct InstrumentProfile {
    pub kind: InstrumentKind,
    pub aliases: AliasTable,
    pub search_dirs: Vec<PathBuf>,
    pub end_of_night: NaiveTime,
    pub saturation: Saturation,
    pub rules: Vec<Rule>,
    pub prefix: PrefixFn,
    pub overrides: OverrideTable,
}

impl InstrumentProfile {
    pub fn for_instrument(kind: InstrumentKind) -> Self {
        match kind {
            InstrumentKind::Esi => esi::profile(),
            InstrumentKind::Nires => nires::profile(),
            InstrumentKind::Nirspec => nirspec::profile(),
            InstrumentKind::Deimos => generic::deimos_profile(),
            InstrumentKind::Osiris => generic::osiris_profile(),
        }
    }

    /// Profile with the shared rule sequence and no overrides
    pub(crate) fn base(kind: InstrumentKind, prefix: PrefixFn) -> Self {
        Self {
            kind,
            aliases: AliasTable::new(),
            search_dirs: Vec::new(),
            end_of_night: cutoff(DEFAULT_END_OF_NIGHT),
            saturation: Saturation::Fixed(DEFAULT_SATURATION),
            rules: rules::BASE_SEQUENCE.to_vec(),
            prefix,
            overrides: base::no_overrides,
        }
    }

    pub fn step_for(&self, rule: Rule) -> Option<StepFn> {
        (self.overrides)(rule).or_else(|| base::step(rule))
    }
}

pub(crate) fn cutoff(text: &str) -> NaiveTime {
    NaiveTime::parse_from_str(text, "%H:%M:%S").unwrap_or(NaiveTime::MIN)
}

/// Values fixed for the whole run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub ut_date: NaiveDate,
    /// Stamped into DQA_DATE; fixed so re-running a file is idempotent
    pub dqa_date: NaiveDateTime,
    pub version: String,
    pub oa: String,
}

impl RunContext {
    pub fn new(ut_date: NaiveDate, dqa_date: NaiveDateTime) -> Self {
        Self {
            ut_date,
            dqa_date,
            version: DQA_VERSION.to_string(),
            oa: "None".to_string(),
        }
    }

    pub fn with_oa(mut self, oa: impl Into<String>) -> Self {
        self.oa = oa.into();
        self
    }
}

/// Interprets an instrument's rule sequence against one file at a time
pub struct RuleEngine {
    profile: InstrumentProfile,
    context: RunContext,
    span: Span,
}

impl RuleEngine {
    pub fn new(profile: InstrumentProfile, context: RunContext, span: Span) -> Self {
        Self {
            profile,
            context,
            span,
        }
    }

    pub fn profile(&self) -> &InstrumentProfile {
        &self.profile
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Run every rule in order. Stops at the first rejection; on success
    /// every derived keyword is present, possibly as a sentinel.
    pub fn run_checks(
        &self,
        file: &mut FitsFile,
        program: Option<&ProgramInfo>,
    ) -> Result<ExtraMeta, Rejection> {
        let _entered = self.span.enter();
        let mut extra = ExtraMeta::new();
        let mut step = Step {
            kw: KeywordResolver::new(&mut file.primary.header, &self.profile.aliases),
            pixels: file.pixels.as_deref(),
            program,
            context: &self.context,
            profile: &self.profile,
            extra: &mut extra,
        };

        for &rule in &self.profile.rules {
            match self.profile.step_for(rule) {
                Some(run) => run(&mut step).inspect_err(|rejection| {
                    warn!("{:?} rejected {}: {}", rule, file.path.display(), rejection);
                })?,
                None => debug!("{} has no implementation of {:?}", self.profile.kind, rule),
            }
        }
        Ok(extra)
    }
}
