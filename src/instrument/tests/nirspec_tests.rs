//! NIRSPEC rule tests

use super::*;
use crate::error::Rejection;
use crate::header::Value;
use crate::instrument::nirspec::{self, Slit};
use crate::keywords::{AliasTable, KeywordResolver};

fn spectrum(changes: &[(&'static str, Value)]) -> FitsFile {
    let mut cards: Vec<(&str, Value)> = vec![
        ("INSTRUME", "NIRSPEC".into()),
        ("DATE-OBS", "2019-01-10".into()),
        ("UTC", "10:00:00.25".into()),
        ("CAMERA", "SPEC".into()),
        ("DATAFILE", "nspec190110_0042".into()),
        ("FRAMENUM", 42i64.into()),
        ("OBSTYPE", "Object".into()),
        ("ECHLPOS", 62.0.into()),
        ("SLITNAME", "0.432x12".into()),
        ("FILTER", "NIRSPEC-5".into()),
        ("TRUITIME", 10.0.into()),
        ("ITIME", 10.0.into()),
        ("COADDS", 2i64.into()),
    ];
    for (keyword, value) in changes {
        cards.retain(|(k, _)| k != keyword);
        cards.push((*keyword, value.clone()));
    }
    frame(&cards)
}

#[test]
fn test_high_dispersion_spectrum() {
    let mut file = spectrum(&[]);
    engine(InstrumentKind::Nirspec)
        .run_checks(&mut file, None)
        .unwrap();

    assert_eq!(text(&file, "KOAID"), "NS.20190110.100000.fits");
    assert_eq!(text(&file, "KOAIMTYP"), "object");
    assert_eq!(text(&file, "FRAMENO"), "42");
    assert_eq!(text(&file, "OFNAME"), "nspec190110_0042.fits");
    assert_eq!(text(&file, "ELAPTIME"), "20");
    assert_eq!(text(&file, "ISAO"), "no");
    assert_eq!(text(&file, "DISPERS"), "high");
    assert_eq!(text(&file, "DISPSCAL"), "0.144");
    assert_eq!(text(&file, "SPATSCAL"), "0.19");
    assert_eq!(text(&file, "SLITLEN"), "12");
    assert_eq!(text(&file, "SLITWIDT"), "0.432");
    assert_eq!(text(&file, "SPECRES"), "25000");
    assert_eq!(text(&file, "WAVECNTR"), "1.6195");
    assert_eq!(text(&file, "DETGAIN"), "2.85");
    assert_eq!(text(&file, "DETRN"), "10.8");
    assert_eq!(text(&file, "SATURATE"), "50000");
    assert_eq!(text(&file, "NPIXSAT"), "1");
}

#[test]
fn test_second_run_changes_nothing() {
    let engine = engine(InstrumentKind::Nirspec);
    let mut file = spectrum(&[]);
    engine.run_checks(&mut file, None).unwrap();
    let first = file.header().clone();

    engine.run_checks(&mut file, None).unwrap();
    assert_eq!(file.header(), &first);
}

#[test]
fn test_low_dispersion_resolution_table() {
    let mut file = spectrum(&[("ECHLPOS", 120.0.into()), ("SLITNAME", "42x0.380".into())]);
    engine(InstrumentKind::Nirspec)
        .run_checks(&mut file, None)
        .unwrap();
    assert_eq!(text(&file, "DISPERS"), "low");
    assert_eq!(text(&file, "SLITLEN"), "42");
    assert_eq!(text(&file, "SLITWIDT"), "0.38");
    assert_eq!(text(&file, "SPECRES"), "2500");

    let mut file = spectrum(&[("ECHLPOS", 120.0.into()), ("SLITNAME", "42x0.500".into())]);
    engine(InstrumentKind::Nirspec)
        .run_checks(&mut file, None)
        .unwrap();
    assert_eq!(text(&file, "SPECRES"), "null");
}

#[test]
fn test_ao_spatial_scale() {
    let mut file = spectrum(&[("INSTRUME", "NIRSPAO".into())]);
    engine(InstrumentKind::Nirspec)
        .run_checks(&mut file, None)
        .unwrap();
    assert_eq!(text(&file, "ISAO"), "yes");
    assert_eq!(text(&file, "SPATSCAL"), "0.018");
}

#[test]
fn test_slit_viewing_camera() {
    let mut file = spectrum(&[("CAMERA", "SCAM".into())]);
    engine(InstrumentKind::Nirspec)
        .run_checks(&mut file, None)
        .unwrap();
    assert_eq!(text(&file, "KOAID"), "NC.20190110.100000.fits");
    assert_eq!(text(&file, "SPATSCAL"), "0.178");
    assert_eq!(text(&file, "DISPERS"), "null");
    assert_eq!(text(&file, "SLITLEN"), "null");
    assert_eq!(text(&file, "DETRN"), "null");
}

#[test]
fn test_missing_echelle_position() {
    let mut file = spectrum(&[]);
    file.header_mut().remove("ECHLPOS");
    engine(InstrumentKind::Nirspec)
        .run_checks(&mut file, None)
        .unwrap();
    assert_eq!(text(&file, "DISPERS"), "unknown");
    assert_eq!(text(&file, "SPECRES"), "null");
}

#[test]
fn test_calibration_classification() {
    let arc = spectrum(&[
        ("OBSTYPE", "calib".into()),
        ("XENON", "On".into()),
        ("CALMPOS", "In".into()),
        ("CALPPOS", "Out".into()),
    ]);
    let flat_on = spectrum(&[
        ("OBSTYPE", "calib".into()),
        ("FLIMAGIN", "on".into()),
        ("FLSPECTR", "off".into()),
        ("CALMPOS", "in".into()),
        ("CALPPOS", "out".into()),
    ]);
    let flat_off = spectrum(&[
        ("OBSTYPE", "calib".into()),
        ("FLIMAGIN", "off".into()),
        ("FLSPECTR", "off".into()),
        ("CALMPOS", "in".into()),
    ]);
    let zero_exposure = spectrum(&[("OBSTYPE", "calib".into()), ("ITIME", 0.0.into())]);

    for (file, expected) in [
        (arc, "arclamp"),
        (flat_on, "flatlamp"),
        (flat_off, "flatlampoff"),
        (zero_exposure, "bias"),
    ] {
        let mut header = file.primary.header;
        let aliases = AliasTable::new();
        let kw = KeywordResolver::new(&mut header, &aliases);
        assert_eq!(nirspec::classify(&kw), expected);
    }
}

#[test]
fn test_filter_band_last_match_wins() {
    assert_eq!(nirspec::filter_band("NIRSPEC-1"), Some((0.9470, 1.0340, 1.1210)));
    // K-PRIME also contains K, which appears later
    assert_eq!(nirspec::filter_band("k-prime"), Some((1.9960, 2.1890, 2.3820)));
    assert_eq!(nirspec::filter_band("OPEN"), None);
}

#[test]
fn test_split_slit_name_orders_sides() {
    let slit = nirspec::split_slit_name("0.144x12").unwrap();
    assert_eq!(
        slit,
        Slit {
            length: 12.0,
            width: 0.144,
            width_text: "0.144".to_string(),
        }
    );
    assert_eq!(nirspec::split_slit_name("42x0.760").unwrap().width_text, "0.760");
    assert!(nirspec::split_slit_name("open").is_none());
}

#[test]
fn test_missing_exposure_time() {
    let mut file = spectrum(&[]);
    file.header_mut().remove("TRUITIME");
    match engine(InstrumentKind::Nirspec)
        .run_checks(&mut file, None)
        .unwrap_err()
    {
        Rejection::BadElaptime { missing } => assert!(missing.contains("TRUITIME")),
        other => panic!("Expected BadElaptime, got {:?}", other),
    }
}
