//! NIRSPEC: near-infrared echelle spectrograph (NS frames) and its slit-viewing
//! camera (NC frames). Behind the AO system INSTRUME reads NIRSPAO.

use std::path::PathBuf;

use tracing::{debug, warn};

use super::base::{self, set_image_type};
use super::{InstrumentKind, InstrumentProfile, Rule, Saturation, Step, StepFn, cutoff};
use crate::constants::{UNDEFINED_IMAGE_TYPE, comments};
use crate::error::Rejection;
use crate::keywords::{AliasTable, Keyword, KeywordResolver};

/// Detector full well per coadd
const SATURATION_PER_COADD: f64 = 25000.0;

const DETECTOR_GAIN: f64 = 2.85;
const SPEC_READ_NOISE: f64 = 10.8;

/// Slit-viewing camera plate scale in arcsec/pixel
const SCAM_SPATIAL_SCALE: f64 = 0.178;

/// ECHLPOS at or below this is high dispersion
const HIGH_DISPERSION_ECHLPOS: f64 = 100.0;

/// Low-dispersion slit width (trailing zeros stripped) to resolving power
const LOW_RES_SPECRES: &[(&str, i64)] = &[("0.38", 2500), ("0.57", 2000), ("0.76", 1800)];

/// High-dispersion resolving power is this over the slit width
const HIGH_RES_CONSTANT: f64 = 10800.0;

/// Filter name fragment to (blue, center, red) in microns. Later matches win.
const FILTERS: &[(&str, (f64, f64, f64))] = &[
    ("NIRSPEC-1", (0.9470, 1.0340, 1.1210)),
    ("NIRSPEC-2", (1.0890, 1.1910, 1.2930)),
    ("NIRSPEC-3", (1.1430, 1.2590, 1.3750)),
    ("NIRSPEC-4", (1.2410, 1.4170, 1.5930)),
    ("NIRSPEC-5", (1.4310, 1.6195, 1.8080)),
    ("NIRSPEC-6", (1.5580, 1.9365, 2.3150)),
    ("NIRSPEC-7", (1.8390, 2.2345, 2.6300)),
    ("Br-Gamma", (2.1550, 2.1650, 2.1750)),
    ("BR-GAMMA", (2.1550, 2.1650, 2.1750)),
    ("CO", (2.2810, 2.2930, 2.3050)),
    ("K-PRIME", (1.9500, 2.1225, 2.2950)),
    ("K", (1.9960, 2.1890, 2.3820)),
    ("L-PRIME", (3.4200, 3.7700, 4.1200)),
    ("M-PRIME", (4.5700, 4.6900, 4.8100)),
    ("KL", (2.1340, 3.1810, 4.2280)),
    ("HEI", (1.0776, 1.0830, 1.0884)),
    ("PA-BETA", (1.2757, 1.2823, 1.2888)),
    ("FEII", (1.6390, 1.6465, 1.6540)),
    ("H2", (2.1100, 2.1195, 2.1290)),
    ("M-WIDE", (4.4200, 4.9750, 5.5300)),
];

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
    Rule::IsAo,
    Rule::Dispersion,
    Rule::SlitValues,
    Rule::Wavelengths,
    Rule::Weather,
    Rule::ImageStats,
    Rule::GainReadNoise,
    Rule::SaturatedPixels,
    Rule::ObservingAssistant,
    Rule::ProgramInfo,
    Rule::ProprietaryPeriod,
];

pub fn profile() -> InstrumentProfile {
    InstrumentProfile {
        aliases: AliasTable::new()
            .with(Keyword::Ofname, "DATAFILE")
            .with(Keyword::Frameno, "FRAMENUM"),
        search_dirs: search_dirs(),
        end_of_night: cutoff("19:00:00"),
        saturation: Saturation::PerCoadd(SATURATION_PER_COADD),
        rules: SEQUENCE.to_vec(),
        overrides,
        ..InstrumentProfile::base(InstrumentKind::Nirspec, prefix)
    }
}

fn overrides(rule: Rule) -> Option<StepFn> {
    let run: StepFn = match rule {
        Rule::Elaptime => elaptime,
        Rule::ImageType => image_type,
        Rule::OriginalName => original_name,
        Rule::IsAo => is_ao,
        Rule::Dispersion => dispersion,
        Rule::SlitValues => slit_values,
        Rule::Wavelengths => wavelengths,
        Rule::GainReadNoise => gain_read_noise,
        _ => return None,
    };
    Some(run)
}

fn search_dirs() -> Vec<PathBuf> {
    (0..=3)
        .flat_map(|i| {
            let root = format!("/s/sdata60{}", i);
            (1..=9)
                .map(move |j| PathBuf::from(format!("{}/nspec{}", root, j)))
                .chain(
                    ["nspeceng", "nirspec"]
                        .into_iter()
                        .map(move |account| PathBuf::from(format!("/s/sdata60{}/{}", i, account))),
                )
        })
        .collect()
}

/// CAMERA (or OUTDIR when CAMERA is absent) names the detector
fn prefix(kw: &KeywordResolver<'_>) -> Option<&'static str> {
    let camera = match kw.get(Keyword::Camera) {
        Some(_) => kw.get_lower(Keyword::Camera),
        None => kw.get_lower(Keyword::Outdir),
    };
    if camera.contains("scam") {
        Some("NC")
    } else if camera.contains("spec") {
        Some("NS")
    } else {
        None
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// ELAPTIME = TRUITIME * COADDS, to five decimals
fn elaptime(step: &mut Step<'_>) -> Result<(), Rejection> {
    if step.kw.get(Keyword::Elaptime).is_some() {
        return Ok(());
    }
    let truitime = step.kw.get_f64(Keyword::Truitime).ok();
    let coadds = step.kw.get_f64(Keyword::Coadds).ok();
    let (Some(truitime), Some(coadds)) = (truitime, coadds) else {
        return Err(Rejection::BadElaptime {
            missing: "TRUITIME and COADDS".to_string(),
        });
    };
    step.kw.set(
        Keyword::Elaptime,
        round_to(truitime * coadds, 5),
        comments::ELAPTIME,
    );
    Ok(())
}

fn obstype_image_type(obstype: &str) -> Option<&'static str> {
    match obstype {
        "object" | "standard" | "telluric" => Some("object"),
        "bias" => Some("bias"),
        "dark" => Some("dark"),
        "domeflat" => Some("domeflat"),
        "domearc" => Some("domearc"),
        _ => None,
    }
}

/// Image type from OBSTYPE, falling back to the calibration unit state
pub(crate) fn classify(kw: &KeywordResolver<'_>) -> &'static str {
    if let Some(image_type) = obstype_image_type(&kw.get_lower(Keyword::Obstype)) {
        return image_type;
    }
    debug!("KOAIMTYP from calibration unit state");

    let calmpos = kw.get_lower(Keyword::Calmpos);
    let calppos = kw.get_lower(Keyword::Calppos);
    let on = |k: Keyword| kw.get_lower(k) == "on";

    if on(Keyword::Argon) || on(Keyword::Krypton) || on(Keyword::Neon) || on(Keyword::Xenon) {
        return if calmpos == "in" && calppos == "out" {
            "arclamp"
        } else {
            UNDEFINED_IMAGE_TYPE
        };
    }

    let flat = match (kw.get(Keyword::Flimagin), kw.get(Keyword::Flspectr)) {
        (None, None) => None,
        _ => Some(on(Keyword::Flimagin) || on(Keyword::Flspectr)),
    };
    match flat {
        Some(false) if calmpos == "in" => return "flatlampoff",
        Some(true) if calmpos == "in" && calppos == "out" => return "flatlamp",
        Some(_) => return UNDEFINED_IMAGE_TYPE,
        None => {}
    }

    if kw.get_f64(Keyword::Itime).ok() == Some(0.0) {
        return "bias";
    }
    debug!("Legacy object branch reached; CALCPOS is not written by current headers");
    if calmpos == "out" && calppos == "out" && kw.get_lower(Keyword::Calcpos) == "out" {
        return "object";
    }
    UNDEFINED_IMAGE_TYPE
}

fn image_type(step: &mut Step<'_>) -> Result<(), Rejection> {
    let image_type = classify(&step.kw);
    set_image_type(step, image_type);
    Ok(())
}

/// Native OFNAME is kept; otherwise DATAFILE with a `.fits` suffix
fn original_name(step: &mut Step<'_>) -> Result<(), Rejection> {
    if step.kw.get_unaliased(Keyword::Ofname).is_some() {
        return Ok(());
    }
    let datafile = step
        .kw
        .get_str(Keyword::Ofname)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or(Rejection::BadOutfile)?;
    let name = base::with_fits_suffix(datafile.trim());
    debug!("OFNAME = {}", name);
    step.kw.set(Keyword::Ofname, name, comments::OFNAME);
    Ok(())
}

fn is_ao(step: &mut Step<'_>) -> Result<(), Rejection> {
    let instrume = step.kw.get_str(Keyword::Instrume).ok().unwrap_or_default();
    let isao = if instrume.trim() == "NIRSPAO" { "yes" } else { "no" };
    step.kw.set(Keyword::Isao, isao, comments::ISAO);
    Ok(())
}

fn koaid(kw: &KeywordResolver<'_>) -> String {
    kw.get_str(Keyword::Koaid).ok().unwrap_or_default()
}

fn is_scam(kw: &KeywordResolver<'_>) -> bool {
    koaid(kw).contains("NC")
}

fn is_spec(kw: &KeywordResolver<'_>) -> bool {
    koaid(kw).starts_with("NS")
}

fn ao(kw: &KeywordResolver<'_>) -> bool {
    kw.get_lower(Keyword::Isao) == "yes"
}

enum Dispersion {
    Camera,
    Unknown,
    High,
    Low,
}

fn dispersion(step: &mut Step<'_>) -> Result<(), Rejection> {
    let mode = if is_scam(&step.kw) {
        Dispersion::Camera
    } else {
        match step.kw.get_f64(Keyword::Echlpos).ok() {
            None => Dispersion::Unknown,
            Some(pos) if pos <= HIGH_DISPERSION_ECHLPOS => Dispersion::High,
            Some(_) => Dispersion::Low,
        }
    };
    let ao = ao(&step.kw);

    let (dispers, dispscal, spatscal) = match mode {
        Dispersion::Camera => (None, None, Some(SCAM_SPATIAL_SCALE)),
        Dispersion::Unknown => (Some("unknown"), None, None),
        Dispersion::High => (Some("high"), Some(0.144), Some(if ao { 0.018 } else { 0.190 })),
        Dispersion::Low => (Some("low"), Some(0.190), Some(if ao { 0.013 } else { 0.144 })),
    };

    match dispers {
        Some(d) => step.kw.set(Keyword::Dispers, d, comments::DISPERS),
        None => step.kw.set_null(Keyword::Dispers, comments::DISPERS),
    }
    match dispscal {
        Some(s) => step.kw.set(Keyword::Dispscal, s, comments::DISPSCAL),
        None => step.kw.set_null(Keyword::Dispscal, comments::DISPSCAL),
    }
    match spatscal {
        Some(s) => step.kw.set(Keyword::Spatscal, s, comments::SPATSCAL),
        None => step.kw.set_null(Keyword::Spatscal, comments::SPATSCAL),
    }
    Ok(())
}

/// Slit dimensions in arcsec, longer side as the length
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Slit {
    pub length: f64,
    pub width: f64,
    /// Width as written in SLITNAME
    pub width_text: String,
}

/// Parse `42x0.380` (low dispersion) or `0.144x12` (high dispersion)
pub(crate) fn split_slit_name(slitname: &str) -> Option<Slit> {
    let (a, b) = slitname.trim().split_once('x')?;
    let (a, b) = (a.trim(), b.trim());
    let (a_val, b_val) = (a.parse::<f64>().ok()?, b.parse::<f64>().ok()?);
    let slit = if b_val > a_val {
        Slit { length: b_val, width: a_val, width_text: a.to_string() }
    } else {
        Slit { length: a_val, width: b_val, width_text: b.to_string() }
    };
    Some(slit)
}

/// Low-dispersion table key: trailing zeros of the width removed
fn low_res_key(width: &str) -> &str {
    width.trim_end_matches('0')
}

fn slit_values(step: &mut Step<'_>) -> Result<(), Rejection> {
    let slit = if is_spec(&step.kw) {
        step.kw
            .get_str(Keyword::Slitname)
            .ok()
            .and_then(|name| split_slit_name(&name))
    } else {
        None
    };

    let Some(slit) = slit else {
        step.kw.set_null(Keyword::Slitlen, comments::SLITLEN);
        step.kw.set_null(Keyword::Slitwidt, comments::SLITWIDT);
        step.kw.set_null(Keyword::Specres, comments::SPECRES);
        return Ok(());
    };

    let specres = match step.kw.get_lower(Keyword::Dispers).as_str() {
        "low" => {
            let key = low_res_key(&slit.width_text);
            let found = LOW_RES_SPECRES
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, r)| *r);
            if found.is_none() {
                warn!("No low dispersion resolution for slit width {}", slit.width_text);
            }
            found
        }
        "high" if slit.width > 0.0 => {
            if ao(&step.kw) {
                debug!("AO high dispersion slit widths are not rescaled");
            }
            Some((HIGH_RES_CONSTANT / slit.width).round() as i64)
        }
        _ => None,
    };

    step.kw.set(Keyword::Slitlen, slit.length, comments::SLITLEN);
    step.kw.set(Keyword::Slitwidt, slit.width, comments::SLITWIDT);
    match specres {
        Some(r) => step.kw.set(Keyword::Specres, r, comments::SPECRES),
        None => step.kw.set_null(Keyword::Specres, comments::SPECRES),
    }
    Ok(())
}

/// (blue, center, red) of the last table entry whose name occurs in FILTER
pub(crate) fn filter_band(filter: &str) -> Option<(f64, f64, f64)> {
    let upper = filter.to_uppercase();
    FILTERS
        .iter()
        .filter(|(name, _)| upper.contains(name))
        .last()
        .map(|(_, band)| *band)
}

fn wavelengths(step: &mut Step<'_>) -> Result<(), Rejection> {
    let band = step
        .kw
        .get_str(Keyword::Filter)
        .ok()
        .and_then(|f| filter_band(&f));
    match band {
        Some((blue, center, red)) => {
            step.kw.set(Keyword::Waveblue, blue, comments::WAVEBLUE);
            step.kw.set(Keyword::Wavecntr, center, comments::WAVECNTR);
            step.kw.set(Keyword::Wavered, red, comments::WAVERED);
        }
        None => {
            step.kw.set_null(Keyword::Waveblue, comments::WAVEBLUE);
            step.kw.set_null(Keyword::Wavecntr, comments::WAVECNTR);
            step.kw.set_null(Keyword::Wavered, comments::WAVERED);
        }
    }
    Ok(())
}

fn gain_read_noise(step: &mut Step<'_>) -> Result<(), Rejection> {
    step.kw.set(Keyword::Detgain, DETECTOR_GAIN, comments::DETGAIN);
    if is_spec(&step.kw) {
        step.kw.set(Keyword::Detrn, SPEC_READ_NOISE, comments::DETRN);
    } else {
        step.kw.set_null(Keyword::Detrn, comments::DETRN);
    }
    Ok(())
}
