//! ESI: Echellette Spectrograph and Imager.

use std::path::PathBuf;

use tracing::debug;

use super::base::{number, set_image_type, zero_pad};
use super::{InstrumentKind, InstrumentProfile, Rule, Step, StepFn};
use crate::constants::{UNDEFINED_IMAGE_TYPE, comments};
use crate::error::Rejection;
use crate::keywords::{AliasTable, Keyword, KeywordResolver};

const PIXEL_SCALE: f64 = 0.1542;

/// Mean of 0.1542 * wavelength / dispersion over orders 6-15
const RESOLUTION_CONSTANT: f64 = 4125.406;

/// Elevation range, in degrees, that points the telescope at the flat screen
const FLAT_SCREEN_EL: (f64, f64) = (44.0, 46.01);

const SEQUENCE: &[Rule] = &[
    Rule::Instrument,
    Rule::DateObs,
    Rule::Utc,
    Rule::DispersionMode,
    Rule::CameraMode,
    Rule::InstrumentName,
    Rule::ImageType,
    Rule::ArchiveId,
    Rule::FrameNumber,
    Rule::OriginalName,
    Rule::Semester,
    Rule::ProgramInfo,
    Rule::ProprietaryPeriod,
    Rule::DatLevel,
    Rule::ImageStats,
    Rule::Weather,
    Rule::ObservingAssistant,
    Rule::SaturatedPixels,
    Rule::Wavelengths,
    Rule::SlitDims,
    Rule::SpatialScale,
    Rule::DispersionScale,
    Rule::SpectralResolution,
    Rule::DqaVersion,
    Rule::DqaDate,
];

pub fn profile() -> InstrumentProfile {
    InstrumentProfile {
        aliases: AliasTable::new().with(Keyword::Utc, "UT"),
        search_dirs: search_dirs(),
        rules: SEQUENCE.to_vec(),
        overrides,
        ..InstrumentProfile::base(InstrumentKind::Esi, prefix)
    }
}

fn overrides(rule: Rule) -> Option<StepFn> {
    let run: StepFn = match rule {
        Rule::DispersionMode => dispersion_mode,
        Rule::CameraMode => camera_mode,
        Rule::InstrumentName => instrument_name,
        Rule::ImageType => image_type,
        Rule::OriginalName => original_name,
        Rule::Wavelengths => wavelengths,
        Rule::SlitDims => slit_dims,
        Rule::SpatialScale => spatial_scale,
        Rule::DispersionScale => dispersion_scale,
        Rule::SpectralResolution => spectral_resolution,
        _ => return None,
    };
    Some(run)
}

/// `/s/sdata70{0..7}/esi{1..20}` and `esieng`; sdata705 does not exist
fn search_dirs() -> Vec<PathBuf> {
    (0..8)
        .filter(|&i| i != 5)
        .flat_map(|i| {
            let root = format!("/s/sdata70{}", i);
            (1..=20)
                .map(move |j| PathBuf::from(format!("{}/esi{}", root, j)))
                .chain(std::iter::once(PathBuf::from(format!("/s/sdata70{}/esieng", i))))
        })
        .collect()
}

fn prefix(_kw: &KeywordResolver<'_>) -> Option<&'static str> {
    Some("EI")
}

/// low, high or null from the filter, lens and prism positions
fn derive_dispersion_mode(kw: &KeywordResolver<'_>) -> String {
    if let Some(mode) = kw.get_str(Keyword::Dispmode).ok() {
        return mode;
    }
    let imfltnam = kw.get_lower(Keyword::Imfltnam);
    let ldfltnam = kw.get_lower(Keyword::Ldfltnam);
    let prismnam = kw.get_lower(Keyword::Prismnam);
    match (imfltnam.as_str(), ldfltnam.as_str(), prismnam.as_str()) {
        ("out", "in", "in") => "low",
        ("out", "out", "in") => "high",
        _ => "null",
    }
    .to_string()
}

fn derive_camera(kw: &KeywordResolver<'_>) -> String {
    if let Some(camera) = kw.get_str(Keyword::Camera).ok() {
        return camera;
    }
    match derive_dispersion_mode(kw).as_str() {
        "low" | "high" => "spec",
        _ => "imag",
    }
    .to_string()
}

fn dispersion_mode(step: &mut Step<'_>) -> Result<(), Rejection> {
    if step.kw.get(Keyword::Dispmode).is_none() {
        let mode = derive_dispersion_mode(&step.kw);
        step.kw.set(Keyword::Dispmode, mode, comments::DISPMODE);
    }
    Ok(())
}

fn camera_mode(step: &mut Step<'_>) -> Result<(), Rejection> {
    if step.kw.get(Keyword::Camera).is_none() {
        let camera = derive_camera(&step.kw);
        step.kw.set(Keyword::Camera, camera, comments::CAMERA);
    }
    Ok(())
}

fn instrument_name(step: &mut Step<'_>) -> Result<(), Rejection> {
    let instrume = step.kw.get_str(Keyword::Instrume).ok().unwrap_or_default();
    if instrume.contains("ESI") && instrume != "ESI" {
        step.kw.set(Keyword::Instrume, "ESI", comments::INSTRUME);
    }
    Ok(())
}

/// Keywords the classification reads, lower-cased
struct Configuration {
    obstype: String,
    slmsknam: String,
    prismnam: String,
    imfltnam: String,
    hatch_open: bool,
    flat: bool,
    arc: bool,
    flat_position: bool,
    axes_tracking: bool,
    dome_tracking: bool,
}

impl Configuration {
    /// `None` when any keyword the decision tree depends on is missing
    fn read(kw: &KeywordResolver<'_>) -> Option<Self> {
        let text = |k: Keyword| kw.get_str(k).ok().map(|s| s.trim().to_lowercase());
        let el = kw.get_f64(Keyword::El).ok()?;
        let lamp_on = |k: Keyword| text(k).map(|s| s == "on");

        let arc = lamp_on(Keyword::Lampar1)?
            | lamp_on(Keyword::Lampcu1)?
            | lamp_on(Keyword::Lampne1)?
            | lamp_on(Keyword::Lampne2)?;
        // DWFILNAM is required even though no branch reads it
        text(Keyword::Dwfilnam)?;

        Some(Self {
            obstype: text(Keyword::Obstype)?,
            slmsknam: text(Keyword::Slmsknam)?,
            prismnam: text(Keyword::Prismnam)?,
            imfltnam: text(Keyword::Imfltnam)?,
            hatch_open: text(Keyword::Hatchpos)? != "closed",
            flat: lamp_on(Keyword::Lampqtz1)?,
            arc,
            flat_position: (FLAT_SCREEN_EL.0..=FLAT_SCREEN_EL.1).contains(&el),
            axes_tracking: text(Keyword::Axestat)? == "tracking",
            dome_tracking: text(Keyword::Domestat)? == "tracking",
        })
    }

    /// Dome-flat style pointing used for both traces and flats
    fn at_flat_screen(&self) -> bool {
        let dmflat = self.obstype == "dmflat";
        (dmflat && !self.dome_tracking && self.flat_position)
            || (!self.axes_tracking && !self.dome_tracking && self.flat_position)
            || (dmflat && !self.axes_tracking && self.flat_position)
    }

    fn classify(&self) -> &'static str {
        let prism_in = self.prismnam == "in";
        let imfilter_out = self.imfltnam == "out";

        if self.slmsknam.contains("hole") {
            if !self.hatch_open {
                if self.flat && !self.arc && prism_in && imfilter_out {
                    return "trace";
                }
                if self.flat && !self.arc && !prism_in && !imfilter_out {
                    return "focus";
                }
                if !self.flat && self.arc && prism_in && imfilter_out {
                    return "focus";
                }
            } else if self.at_flat_screen() {
                return if prism_in && imfilter_out { "trace" } else { "focus" };
            }
            debug!("ESI pinhole focus branch on IDFLTNAM is inactive");
            return UNDEFINED_IMAGE_TYPE;
        }

        if !self.hatch_open {
            if self.flat && !self.arc {
                return "flatlamp";
            }
            if !self.flat && self.arc && prism_in && imfilter_out {
                return "arclamp";
            }
        } else {
            let dmflat = self.obstype == "dmflat";
            if self.at_flat_screen() || (dmflat && !self.axes_tracking && !self.dome_tracking) {
                return "flatlamp";
            }
            if !self.flat && !self.arc {
                return "object";
            }
        }
        UNDEFINED_IMAGE_TYPE
    }
}

pub(crate) fn classify(kw: &KeywordResolver<'_>) -> &'static str {
    match kw.get_lower(Keyword::Obstype).as_str() {
        "bias" => return "bias",
        "dark" => return "dark",
        _ => {}
    }
    match Configuration::read(kw) {
        Some(config) => config.classify(),
        None => {
            debug!("ESI configuration keywords incomplete");
            UNDEFINED_IMAGE_TYPE
        }
    }
}

fn image_type(step: &mut Step<'_>) -> Result<(), Rejection> {
    let image_type = classify(&step.kw);
    set_image_type(step, image_type);
    Ok(())
}

/// OFNAME is OUTFILE plus the zero-padded frame number
fn original_name(step: &mut Step<'_>) -> Result<(), Rejection> {
    let outfile = step.kw.get_str(Keyword::Outfile).ok();
    let frame = step.kw.get_str(Keyword::Frameno).ok();
    let (Some(outfile), Some(frame)) = (outfile, frame) else {
        return Err(Rejection::BadOutfile);
    };
    let name = format!("{}{}.fits", outfile.trim(), zero_pad(&frame, 4));
    debug!("OFNAME = {}", name);
    step.kw.set(Keyword::Ofname, name, comments::OFNAME);
    Ok(())
}

/// (red, center, blue) in Angstroms for the imaging filters
fn imaging_band(filter: &str) -> Option<(i64, i64, i64)> {
    match filter.trim() {
        "B" => Some((5400, 4400, 3700)),
        "V" => Some((6450, 5200, 4900)),
        "R" => Some((7400, 6500, 6000)),
        "I" => Some((9000, 8000, 7000)),
        _ => None,
    }
}

fn wavelengths(step: &mut Step<'_>) -> Result<(), Rejection> {
    let band = match derive_camera(&step.kw).as_str() {
        "spec" => Some((10900, 7400, 3900)),
        _ => step
            .kw
            .get_str(Keyword::Dwfilnam)
            .ok()
            .and_then(|f| imaging_band(&f)),
    };
    match band {
        Some((red, center, blue)) => {
            step.kw.set(Keyword::Wavered, red, comments::WAVERED);
            step.kw.set(Keyword::Wavecntr, center, comments::WAVECNTR);
            step.kw.set(Keyword::Waveblue, blue, comments::WAVEBLUE);
        }
        None => {
            step.kw.set_null(Keyword::Wavered, comments::WAVERED);
            step.kw.set_null(Keyword::Wavecntr, comments::WAVECNTR);
            step.kw.set_null(Keyword::Waveblue, comments::WAVEBLUE);
        }
    }
    Ok(())
}

/// Slit width from mask names such as `0.75_arcsec` or `Slit_1.00`
fn slit_width(mask: &str) -> Option<f64> {
    if mask == "MultiHoles" {
        return Some(0.5);
    }
    let mut parts = mask.split('_');
    let first = parts.next()?;
    first
        .parse::<f64>()
        .ok()
        .or_else(|| parts.next().and_then(|p| p.parse::<f64>().ok()))
}

fn slit_dims(step: &mut Step<'_>) -> Result<(), Rejection> {
    let spec = derive_camera(&step.kw) == "spec";
    let length = match derive_dispersion_mode(&step.kw).as_str() {
        "low" if spec => Some(480),
        "high" if spec => Some(20),
        _ => None,
    };
    let width = step
        .kw
        .get_str(Keyword::Slmsknam)
        .ok()
        .filter(|_| spec)
        .and_then(|mask| slit_width(mask.trim()));

    match length {
        Some(length) => step.kw.set(Keyword::Slitlen, length as i64, comments::SLITLEN),
        None => step.kw.set_null(Keyword::Slitlen, comments::SLITLEN),
    }
    match width {
        Some(width) => step.kw.set(Keyword::Slitwidt, width, comments::SLITWIDT),
        None => step.kw.set_null(Keyword::Slitwidt, comments::SLITWIDT),
    }
    Ok(())
}

fn spatial_scale(step: &mut Step<'_>) -> Result<(), Rejection> {
    step.kw.set(Keyword::Spatscal, PIXEL_SCALE, comments::SPATSCAL);
    Ok(())
}

fn dispersion_scale(step: &mut Step<'_>) -> Result<(), Rejection> {
    step.kw.set(Keyword::Dispscal, PIXEL_SCALE, comments::DISPSCAL);
    Ok(())
}

/// R = 4125.406 / slit width, rounded to the nearest ten
fn spectral_resolution(step: &mut Step<'_>) -> Result<(), Rejection> {
    let width = step
        .kw
        .get_f64(Keyword::Slitwidt)
        .ok()
        .filter(|w| *w > 0.0 && derive_camera(&step.kw) == "spec");
    match width {
        Some(width) => {
            let resolution = (RESOLUTION_CONSTANT / width / 10.0).round() * 10.0;
            step.kw.set(Keyword::Specres, number(resolution), comments::SPECRES);
        }
        None => step.kw.set_null(Keyword::Specres, comments::SPECRES),
    }
    Ok(())
}
