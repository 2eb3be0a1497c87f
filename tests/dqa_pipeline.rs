//! End-to-end DQA runs over synthetic ESI nights
//!
//! Each test writes raw frames into a temporary `/s/sdata701/...` volume, runs
//! the batch pipeline through its public API and inspects the files it leaves
//! behind in the stage and process directories.

mod common;

use std::fs;

use common::{FrameBuilder, Night, text};
use koa_dqa::fits::FitsFile;
use koa_dqa::instrument::InstrumentKind;
use koa_dqa::pipeline::{RunStatus, StatusFileTracker};

/// Purpose: an empty locate list is a successful run with nothing to archive
/// Benefit: quiet nights must not be reported as failures
#[test]
fn test_empty_night_is_success_zero() {
    let night = Night::new();
    night.locate_list(&[]);
    let status = night.dirs.status_file(InstrumentKind::Esi);

    let outcome = night
        .pipeline()
        .with_tracker(Box::new(StatusFileTracker::new(&status)))
        .with_tpx(true)
        .run()
        .unwrap();

    assert_eq!(outcome.status, RunStatus::SuccessZero);
    assert_eq!(outcome.candidates, 0);
    assert!(outcome.batch.accepted.is_empty());
    assert_eq!(
        fs::read_to_string(night.dirs.dqa_list(InstrumentKind::Esi)).unwrap(),
        ""
    );
    assert!(!night.dirs.file_table(common::ut_date()).exists());

    let record = StatusFileTracker::new(&status).load().unwrap();
    assert_eq!(record.fields["arch_stat"], "DONE");
}

/// Purpose: two frames whose timestamps truncate to the same second share a KOAID
/// Benefit: only the first is archived; the second is held for inspection
#[test]
fn test_duplicate_identifier_keeps_first() {
    let night = Night::new();
    let first = night.frame("e0001.fits", &FrameBuilder::esi_dark("07:08:09.10", 1));
    let second = night.frame("e0002.fits", &FrameBuilder::esi_dark("07:08:09.95", 2));
    night.locate_list(&[first.clone(), second.clone()]);

    let outcome = night.pipeline().run().unwrap();

    assert_eq!(outcome.status, RunStatus::Success(1));
    assert_eq!(outcome.batch.identifiers(), vec!["EI.20190110.070809.fits"]);
    assert_eq!(outcome.batch.rejected.len(), 1);
    assert_eq!(outcome.batch.rejected[0].path, second);
    assert_eq!(
        outcome.batch.rejected[0].rejection.reason(),
        "duplicate identifier"
    );

    assert_eq!(
        fs::read_to_string(night.dirs.dqa_list(InstrumentKind::Esi)).unwrap(),
        format!("{}\n", first.display())
    );
    let output = night.output("EI.20190110.070809.fits");
    assert_eq!(text(&output, "OFNAME"), "esi0001.fits");
    assert!(night.dirs.udf.join("e0002.fits").exists());
}

/// Purpose: frames missing FRAMENO or OUTFILE cannot be named and are diverted
/// Benefit: the rest of the batch still archives
#[test]
fn test_missing_frame_number_or_outfile() {
    let night = Night::new();
    let no_frameno = night.frame(
        "e0001.fits",
        &FrameBuilder::esi_dark("07:00:00", 1).without("FRAMENO"),
    );
    let no_outfile = night.frame(
        "e0002.fits",
        &FrameBuilder::esi_dark("07:01:00", 2).without("OUTFILE"),
    );
    let good = night.frame("e0003.fits", &FrameBuilder::esi_dark("07:02:00", 3));
    night.locate_list(&[no_frameno, no_outfile, good.clone()]);

    let outcome = night.pipeline().run().unwrap();

    let reasons: Vec<&str> = outcome
        .batch
        .rejected
        .iter()
        .map(|r| r.rejection.reason())
        .collect();
    assert_eq!(reasons, vec!["bad frameno", "bad outfile"]);
    assert_eq!(outcome.batch.accepted_paths(), vec![good.as_path()]);
    assert!(night.dirs.udf.join("e0001.fits").exists());
    assert!(night.dirs.udf.join("e0002.fits").exists());
}

/// Purpose: an unrecognised imaging filter leaves the wavelengths null
/// Benefit: missing optional metadata never blocks archiving
#[test]
fn test_unknown_filter_gives_null_wavelengths() {
    let night = Night::new();
    let known = night.frame("e0001.fits", &FrameBuilder::esi_imaging("07:00:00", 1, "R"));
    let unknown = night.frame("e0002.fits", &FrameBuilder::esi_imaging("07:01:00", 2, "Halpha"));
    night.locate_list(&[known, unknown]);

    let outcome = night.pipeline().run().unwrap();
    assert_eq!(outcome.status, RunStatus::Success(2));
    assert_eq!(outcome.batch.science_files, 2);

    let known = night.output("EI.20190110.070000.fits");
    assert_eq!(text(&known, "WAVECNTR"), "6500");

    let unknown = night.output("EI.20190110.070100.fits");
    for keyword in ["WAVERED", "WAVECNTR", "WAVEBLUE"] {
        assert_eq!(text(&unknown, keyword), "null");
    }
    assert_eq!(text(&unknown, "KOAIMTYP"), "object");
}

/// Purpose: identifiers dated the previous day are tolerated, older ones only
/// after the end-of-night cutoff
/// Benefit: late files from a night that ran past midnight are not lost
#[test]
fn test_identifier_date_window() {
    let night = Night::new();
    let previous_day = night.frame(
        "e0001.fits",
        &FrameBuilder::esi_dark("07:00:00", 1).card("DATE-OBS", "2019-01-09"),
    );
    let stale_early = night.frame(
        "e0002.fits",
        &FrameBuilder::esi_dark("07:00:00", 2).card("DATE-OBS", "2019-01-08"),
    );
    let stale_late = night.frame(
        "e0003.fits",
        &FrameBuilder::esi_dark("21:00:00", 3).card("DATE-OBS", "2019-01-08"),
    );
    night.locate_list(&[previous_day.clone(), stale_early.clone(), stale_late.clone()]);

    let outcome = night.pipeline().run().unwrap();

    assert_eq!(
        outcome.batch.accepted_paths(),
        vec![previous_day.as_path(), stale_late.as_path()]
    );
    assert_eq!(outcome.batch.rejected.len(), 1);
    assert_eq!(outcome.batch.rejected[0].path, stale_early);
    assert_eq!(outcome.batch.rejected[0].rejection.reason(), "bad date");
}

/// Purpose: a processed file run through DQA again comes out unchanged
/// Benefit: reprocessing a night is safe and pixel data is never touched
#[test]
fn test_reprocessing_is_stable() {
    let night = Night::new();
    let raw = night.frame("e0001.fits", &FrameBuilder::esi_imaging("07:00:00", 1, "V"));
    night.locate_list(&[raw.clone()]);
    night.pipeline().run().unwrap();

    let first = fs::read(night.dirs.lev0.join("EI.20190110.070000.fits")).unwrap();
    let raw_file = FitsFile::open(&raw).unwrap();
    let first_file = night.output("EI.20190110.070000.fits");
    assert_eq!(first_file.pixels, raw_file.pixels);
    assert_eq!(first_file.pixels, Some(vec![10.0, 20.0, 30.0, 40.0]));

    let again = Night::new();
    let copy = again.raw.join("EI.20190110.070000.fits");
    fs::write(&copy, &first).unwrap();
    again.locate_list(&[copy]);
    again.pipeline().run().unwrap();

    let second = fs::read(again.dirs.lev0.join("EI.20190110.070000.fits")).unwrap();
    assert_eq!(first, second);
}

/// Purpose: every table extension of an output file is dumped beside it
#[test]
fn test_extension_tables_written() {
    let night = Night::new();
    let frame = FrameBuilder::esi_dark("07:00:00", 1)
        .telemetry("TELEMETRY", &[("alpha", 42), ("beta", -7)]);
    let raw = night.frame("e0001.fits", &frame);
    night.locate_list(&[raw]);

    night.pipeline().run().unwrap();

    let output = night.output("EI.20190110.070000.fits");
    assert_eq!(output.extensions.len(), 1);

    let table = night.dirs.lev0.join("EI.20190110.070000.ext1.TELEMETRY.tbl");
    let content = fs::read_to_string(table).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "\\ Extended Header Name: TELEMETRY");
    assert_eq!(lines[1], "|NAME    |VALUE      |");
    assert_eq!(lines[2], "|char    |char       |");
    assert_eq!(lines.len(), 7);
    assert!(lines[5].trim_start().starts_with("alpha"));
    assert!(lines[5].contains("42"));
    assert!(lines[6].contains("-7"));
}

/// Purpose: accepted files are listed with their routed archive names
#[test]
fn test_file_list_table() {
    let night = Night::new();
    let files = vec![
        night.frame("e0001.fits", &FrameBuilder::esi_dark("07:00:00", 1)),
        night.frame("e0002.fits", &FrameBuilder::esi_dark("07:01:00", 2)),
    ];
    night.locate_list(&files);

    night.pipeline().run().unwrap();

    let table = fs::read_to_string(night.dirs.file_table(common::ut_date())).unwrap();
    assert_eq!(
        table,
        "e0001.fits EI.20190110.070000.fits\n\
         e0002.fits EI.20190110.070100.fits\n    \
         2 Total FITS files\n"
    );
}
