//! Shared fixtures for the instrument rule tests

use chrono::{NaiveDate, NaiveDateTime};
use tracing::Span;

use super::{InstrumentKind, InstrumentProfile, RuleEngine, RunContext};
use crate::fits::FitsFile;
use crate::header::{Header, Value};

mod nirspec_tests;

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn run_context() -> RunContext {
    let dqa_date =
        NaiveDateTime::parse_from_str("2019-01-11T02:03:04", "%Y-%m-%dT%H:%M:%S").unwrap();
    RunContext::new(date("2019-01-10"), dqa_date)
}

pub fn engine(kind: InstrumentKind) -> RuleEngine {
    RuleEngine::new(
        InstrumentProfile::for_instrument(kind),
        run_context(),
        Span::none(),
    )
}

/// 2x2 float image, one pixel above every saturation level under test
pub fn frame(cards: &[(&str, Value)]) -> FitsFile {
    let mut header = Header::new();
    header.set("SIMPLE", true, "");
    header.set("BITPIX", -32i64, "");
    header.set("NAXIS", 2i64, "");
    header.set("NAXIS1", 2i64, "");
    header.set("NAXIS2", 2i64, "");
    for (keyword, value) in cards {
        header.set(keyword, value.clone(), "");
    }
    FitsFile::new(
        "/s/sdata701/esi3/2019jan10/frame.fits",
        header,
        Some(vec![1.0, 2.0, 3.0, 70000.0]),
    )
}

/// Same frame with some cards removed
pub fn frame_without(cards: &[(&str, Value)], missing: &[&str]) -> FitsFile {
    let kept: Vec<(&str, Value)> = cards
        .iter()
        .filter(|(k, _)| !missing.contains(k))
        .cloned()
        .collect();
    frame(&kept)
}

pub fn text(file: &FitsFile, keyword: &str) -> String {
    file.header()
        .get(keyword)
        .map(|v| v.to_string())
        .unwrap_or_default()
}
