//! Shared rule implementations, used by every instrument unless its override
//! table supplies a replacement.

use chrono::{Datelike, NaiveDate};
use tracing::{debug, warn};

use super::{Rule, Saturation, Step, StepFn};
use crate::constants::{
    DEFAULT_PROPINT, NO_PROGRAM, RAW_DATA_LEVEL, UNDEFINED_IMAGE_TYPE, comments,
};
use crate::error::Rejection;
use crate::header::Value;
use crate::identity::{compute_identifier, parse_header_date, parse_header_time};
use crate::keywords::Keyword;

pub fn no_overrides(_rule: Rule) -> Option<StepFn> {
    None
}

/// Shared implementation of a rule, if there is one
pub fn step(rule: Rule) -> Option<StepFn> {
    let run: StepFn = match rule {
        Rule::DqaDate => dqa_date,
        Rule::DqaVersion => dqa_version,
        Rule::DatLevel => dat_level,
        Rule::Instrument => instrument,
        Rule::DateObs => date_obs,
        Rule::Utc => utc,
        Rule::Elaptime => elaptime,
        Rule::ImageType => image_type,
        Rule::ArchiveId => archive_id,
        Rule::FrameNumber => frame_number,
        Rule::OriginalName => original_name,
        Rule::Semester => semester,
        Rule::ProgramInfo => program_info,
        Rule::ProprietaryPeriod => proprietary_period,
        Rule::ImageStats => image_stats,
        Rule::Weather => weather,
        Rule::ObservingAssistant => observing_assistant,
        Rule::SaturatedPixels => saturated_pixels,
        _ => return None,
    };
    Some(run)
}

fn dqa_date(step: &mut Step<'_>) -> Result<(), Rejection> {
    let stamp = step.context.dqa_date.format("%Y-%m-%dT%H:%M:%S").to_string();
    step.kw.set(Keyword::DqaDate, stamp, comments::DQA_DATE);
    Ok(())
}

fn dqa_version(step: &mut Step<'_>) -> Result<(), Rejection> {
    let version = step.context.version.clone();
    step.kw.set(Keyword::DqaVers, version, comments::DQA_VERS);
    Ok(())
}

fn dat_level(step: &mut Step<'_>) -> Result<(), Rejection> {
    step.kw.set(Keyword::Datlevel, RAW_DATA_LEVEL, comments::DATLEVEL);
    Ok(())
}

fn instrument(step: &mut Step<'_>) -> Result<(), Rejection> {
    let instrume = step.kw.get_str(Keyword::Instrume).ok().unwrap_or_default();
    let upper = instrume.to_ascii_uppercase();
    if step
        .profile
        .kind
        .instrume_tokens()
        .iter()
        .any(|token| upper.contains(token))
    {
        Ok(())
    } else {
        Err(Rejection::BadInstrument { found: instrume })
    }
}

/// `YYYY-MM-DD[T...]` or legacy `dd/mm/yy`, as `YYYY-MM-DD`
fn normalize_date(text: &str) -> Option<String> {
    parse_header_date(text)
        .or_else(|| NaiveDate::parse_from_str(text.trim(), "%d/%m/%y").ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn date_obs(step: &mut Step<'_>) -> Result<(), Rejection> {
    let raw = step.kw.get_str(Keyword::DateObs).ok();
    let normalized = raw.as_deref().and_then(normalize_date).or_else(|| {
        let date = step.kw.get_str(Keyword::Date).ok()?;
        debug!("DATE-OBS unusable, taking date from DATE '{}'", date);
        normalize_date(&date)
    });

    let Some(date) = normalized else {
        return Err(Rejection::BadDateObs);
    };
    if raw.as_deref() != Some(date.as_str()) {
        step.kw.set(Keyword::DateObs, date, comments::DATE_OBS);
    }
    Ok(())
}

fn utc(step: &mut Step<'_>) -> Result<(), Rejection> {
    let resolved = step
        .kw
        .get_str(Keyword::Utc)
        .ok()
        .filter(|t| parse_header_time(t).is_some());
    let utc = match resolved {
        Some(t) => t,
        None => step
            .kw
            .get_str(Keyword::Date)
            .ok()
            .and_then(|d| d.split_once('T').map(|(_, t)| t.trim().to_string()))
            .filter(|t| parse_header_time(t).is_some())
            .ok_or(Rejection::BadUtc)?,
    };

    let canonical_ok = step
        .kw
        .get_unaliased(Keyword::Utc)
        .and_then(|v| v.as_str())
        .is_some_and(|t| parse_header_time(t).is_some());
    if !canonical_ok {
        step.kw.set(Keyword::Utc, utc, comments::UTC);
    }
    Ok(())
}

/// ELAPTIME = ITIME * COADDS when not native
fn elaptime(step: &mut Step<'_>) -> Result<(), Rejection> {
    if step.kw.get(Keyword::Elaptime).is_some() {
        return Ok(());
    }
    let itime = step.kw.get_f64(Keyword::Itime).ok();
    let coadds = step.kw.get_f64(Keyword::Coadds).ok();
    match (itime, coadds) {
        (Some(itime), Some(coadds)) => {
            step.kw.set(Keyword::Elaptime, itime * coadds, comments::ELAPTIME);
            Ok(())
        }
        _ => Err(Rejection::BadElaptime {
            missing: "ITIME and COADDS".to_string(),
        }),
    }
}

/// Native KOAIMTYP is kept; otherwise the type is undefined
fn image_type(step: &mut Step<'_>) -> Result<(), Rejection> {
    if step.kw.get(Keyword::Koaimtyp).is_none() {
        warn!("No image type rule for {}; KOAIMTYP undefined", step.profile.kind);
        step.kw.set(Keyword::Koaimtyp, UNDEFINED_IMAGE_TYPE, comments::KOAIMTYP);
    }
    Ok(())
}

pub(super) fn set_image_type(step: &mut Step<'_>, image_type: &str) {
    if image_type == UNDEFINED_IMAGE_TYPE {
        warn!("Could not determine KOAIMTYP");
    } else {
        debug!("KOAIMTYP = {}", image_type);
    }
    step.kw.set(Keyword::Koaimtyp, image_type, comments::KOAIMTYP);
}

fn archive_id(step: &mut Step<'_>) -> Result<(), Rejection> {
    let prefix = (step.profile.prefix)(&step.kw)
        .ok_or_else(|| Rejection::bad_identifier("cannot determine instrument prefix"))?;
    let id = compute_identifier(&step.kw, prefix)?;
    debug!("KOAID = {}", id);
    step.kw.set(Keyword::Koaid, id.to_string(), comments::KOAID);
    Ok(())
}

fn frame_number(step: &mut Step<'_>) -> Result<(), Rejection> {
    if let Some(frame) = step.kw.get(Keyword::Frameno).cloned() {
        if step.kw.get_unaliased(Keyword::Frameno) != Some(&frame) {
            step.kw.set(Keyword::Frameno, frame, comments::FRAMENO);
        }
        return Ok(());
    }

    let outfile = step.kw.get_str(Keyword::Outfile).ok().unwrap_or_default();
    let fallbacks: &[Keyword] = if outfile.trim_start().starts_with("kf") {
        &[Keyword::Imgnum]
    } else {
        &[Keyword::Filenum, Keyword::Filenum2]
    };
    let frame = fallbacks
        .iter()
        .find_map(|k| step.kw.get(*k).cloned())
        .ok_or(Rejection::BadFrameno)?;
    step.kw.set(Keyword::Frameno, frame, comments::FRAMENO);
    Ok(())
}

/// Left-pad a frame number with zeros
pub(super) fn zero_pad(frame: &str, width: usize) -> String {
    format!("{:0>width$}", frame.trim(), width = width)
}

pub(super) fn with_fits_suffix(name: &str) -> String {
    if name.ends_with(".fits") {
        name.to_string()
    } else {
        format!("{}.fits", name)
    }
}

/// OFNAME from OUTFILE, ROOTNAME or FILENAME plus the padded frame number
fn original_name(step: &mut Step<'_>) -> Result<(), Rejection> {
    if step.kw.get_unaliased(Keyword::Ofname).is_some() {
        return Ok(());
    }
    let root = [Keyword::Outfile, Keyword::Rootname, Keyword::Filename]
        .iter()
        .find_map(|k| step.kw.get_str(*k).ok().filter(|s| !s.trim().is_empty()))
        .ok_or(Rejection::BadOutfile)?;
    let frame = step
        .kw
        .get_str(Keyword::Frameno)
        .ok()
        .ok_or(Rejection::BadFrameno)?;
    let name = format!("{}{}.fits", root.trim(), zero_pad(&frame, 4));
    debug!("OFNAME = {}", name);
    step.kw.set(Keyword::Ofname, name, comments::OFNAME);
    Ok(())
}

/// OFNAME from DATAFILE, for instruments that record the raw name directly
pub(super) fn datafile_original_name(step: &mut Step<'_>) -> Result<(), Rejection> {
    if step.kw.get_unaliased(Keyword::Ofname).is_some() {
        return Ok(());
    }
    let datafile = step
        .kw
        .get_str(Keyword::Datafile)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or(Rejection::BadOutfile)?;
    let name = with_fits_suffix(datafile.trim());
    debug!("OFNAME = {}", name);
    step.kw.set(Keyword::Ofname, name, comments::OFNAME);
    Ok(())
}

/// Feb-Jul is semester A, Aug-Jan semester B of the year it started
pub(crate) fn semester_for(date: NaiveDate) -> String {
    match date.month() {
        1 => format!("{}B", date.year() - 1),
        2..=7 => format!("{}A", date.year()),
        _ => format!("{}B", date.year()),
    }
}

fn semester(step: &mut Step<'_>) -> Result<(), Rejection> {
    let date = step
        .kw
        .get_str(Keyword::DateObs)
        .ok()
        .and_then(|d| parse_header_date(&d))
        .ok_or(Rejection::BadDateObs)?;
    step.kw.set(Keyword::Semester, semester_for(date), comments::SEMESTER);
    Ok(())
}

fn program_info(step: &mut Step<'_>) -> Result<(), Rejection> {
    let none = || NO_PROGRAM.to_string();
    let (progid, pi, institution, title) = match step.program {
        Some(p) => (
            p.progid.clone(),
            p.pi.clone(),
            p.institution.clone(),
            p.title.clone(),
        ),
        None => (none(), none(), none(), none()),
    };
    step.kw.set(Keyword::Progid, progid, comments::PROGID);
    step.kw.set(Keyword::Progpi, pi, comments::PROGPI);
    step.kw.set(Keyword::Proginst, institution, comments::PROGINST);
    step.kw.set(Keyword::Progtitl, title.clone(), comments::PROGTITL);
    step.extra.insert(Keyword::Progtitl.name().to_string(), title);
    Ok(())
}

fn proprietary_period(step: &mut Step<'_>) -> Result<(), Rejection> {
    let months = step
        .program
        .and_then(|p| p.proprietary_months)
        .unwrap_or(DEFAULT_PROPINT);
    step.kw.set(Keyword::Propint, months, comments::PROPINT);
    Ok(())
}

/// Mean, population standard deviation and median of the finite pixels
pub(crate) fn image_statistics(pixels: &[f64]) -> Option<(f64, f64, f64)> {
    let mut finite: Vec<f64> = pixels.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let std = (finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    finite.sort_by(f64::total_cmp);
    let mid = finite.len() / 2;
    let median = if finite.len() % 2 == 0 {
        (finite[mid - 1] + finite[mid]) / 2.0
    } else {
        finite[mid]
    };
    Some((mean, std, median))
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

fn image_stats(step: &mut Step<'_>) -> Result<(), Rejection> {
    match step.pixels.and_then(image_statistics) {
        Some((mean, std, median)) => {
            step.kw.set(Keyword::Imagemn, round_to(mean, 2), comments::IMAGEMN);
            step.kw.set(Keyword::Imagestd, round_to(std, 2), comments::IMAGESTD);
            step.kw.set(Keyword::Imagemd, round_to(median, 2), comments::IMAGEMD);
        }
        None => {
            debug!("No image data; statistics set to null");
            step.kw.set_null(Keyword::Imagemn, comments::IMAGEMN);
            step.kw.set_null(Keyword::Imagestd, comments::IMAGESTD);
            step.kw.set_null(Keyword::Imagemd, comments::IMAGEMD);
        }
    }
    Ok(())
}

fn weather(step: &mut Step<'_>) -> Result<(), Rejection> {
    for keyword in Keyword::WEATHER {
        if step.kw.get(keyword).is_none() {
            step.kw.set_null(keyword, comments::WEATHER);
        }
    }
    Ok(())
}

fn observing_assistant(step: &mut Step<'_>) -> Result<(), Rejection> {
    let oa = step.context.oa.clone();
    step.kw.set(Keyword::Oa, oa, comments::OA);
    Ok(())
}

/// Integral values are written as integers
pub(super) fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Value::Int(value as i64)
    } else {
        Value::Float(value)
    }
}

fn saturated_pixels(step: &mut Step<'_>) -> Result<(), Rejection> {
    let level = match step.profile.saturation {
        Saturation::Fixed(level) => level,
        Saturation::PerCoadd(per_coadd) => {
            let coadds = step.kw.get_f64(Keyword::Coadds).ok().unwrap_or_else(|| {
                warn!("COADDS missing; saturation assumes a single coadd");
                1.0
            });
            per_coadd * coadds
        }
    };
    let count = step
        .pixels
        .map(|p| p.iter().filter(|&&v| v >= level).count())
        .unwrap_or(0);
    step.kw.set(Keyword::Saturate, number(level), comments::SATURATE);
    step.kw.set(Keyword::Npixsat, count as i64, comments::NPIXSAT);
    Ok(())
}
