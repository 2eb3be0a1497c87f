//! NIRES: Near-Infrared Echellette Spectrometer and its slit-viewing imager.

use std::path::PathBuf;

use super::base::datafile_original_name;
use super::{InstrumentKind, InstrumentProfile, Rule, Step, StepFn};
use crate::constants::comments;
use crate::error::Rejection;
use crate::keywords::{AliasTable, Keyword, KeywordResolver};

/// K-band coverage in Angstroms: (red, center, blue)
const K_BAND: (i64, i64, i64) = (19500, 21230, 22950);

const SPECTRAL_RESOLUTION: i64 = 2700;

const SEQUENCE: &[Rule] = &[
    Rule::DqaDate,
    Rule::DqaVersion,
    Rule::DatLevel,
    Rule::Instrument,
    Rule::DateObs,
    Rule::Utc,
    Rule::Elaptime,
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
    Rule::Wavelengths,
    Rule::SpectralResolution,
];

pub fn profile() -> InstrumentProfile {
    InstrumentProfile {
        aliases: AliasTable::new().with(Keyword::Outfile, "DATAFILE"),
        search_dirs: search_dirs(),
        rules: SEQUENCE.to_vec(),
        overrides,
        ..InstrumentProfile::base(InstrumentKind::Nires, prefix)
    }
}

fn overrides(rule: Rule) -> Option<StepFn> {
    let run: StepFn = match rule {
        Rule::FrameNumber => frame_number,
        Rule::OriginalName => datafile_original_name,
        Rule::Wavelengths => wavelengths,
        Rule::SpectralResolution => spectral_resolution,
        _ => return None,
    };
    Some(run)
}

fn search_dirs() -> Vec<PathBuf> {
    (1..=3)
        .flat_map(|i| {
            let root = format!("/s/sdata150{}", i);
            std::iter::once(PathBuf::from(format!("{}/nireseng", root)))
                .chain((1..=9).map(move |j| PathBuf::from(format!("{}/nires{}", root, j))))
        })
        .collect()
}

/// INSTR selects the imager (NI) or the spectrometer (NR)
fn prefix(kw: &KeywordResolver<'_>) -> Option<&'static str> {
    match kw.get_lower(Keyword::Instr).as_str() {
        "imag" => Some("NI"),
        "spec" => Some("NR"),
        _ => None,
    }
}

/// Frame number from the DATAFILE suffix, e.g. `s180404_0002.fits` is `0002`
pub(crate) fn frame_from_datafile(datafile: &str) -> &str {
    let stem = datafile.trim().trim_end_matches(".fits");
    stem.rsplit('_').next().unwrap_or(stem)
}

fn frame_number(step: &mut Step<'_>) -> Result<(), Rejection> {
    if step.kw.get(Keyword::Frameno).is_some() {
        return Ok(());
    }
    let datafile = step
        .kw
        .get_str(Keyword::Datafile)
        .ok()
        .ok_or(Rejection::BadFrameno)?;
    let frame = frame_from_datafile(&datafile).to_string();
    if frame.is_empty() {
        return Err(Rejection::BadFrameno);
    }
    step.kw.set(Keyword::Frameno, frame, comments::FRAMENO);
    Ok(())
}

fn wavelengths(step: &mut Step<'_>) -> Result<(), Rejection> {
    let (red, center, blue) = K_BAND;
    step.kw.set(Keyword::Wavered, red, comments::WAVERED);
    step.kw.set(Keyword::Wavecntr, center, comments::WAVECNTR);
    step.kw.set(Keyword::Waveblue, blue, comments::WAVEBLUE);
    Ok(())
}

fn spectral_resolution(step: &mut Step<'_>) -> Result<(), Rejection> {
    step.kw.set(Keyword::Specres, SPECTRAL_RESOLUTION, comments::SPECRES);
    Ok(())
}
