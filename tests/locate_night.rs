//! Locate followed by DQA, the way a nightly run chains the two commands

mod common;

use std::fs::{self, File};
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use common::{FrameBuilder, Night, ut_date};
use koa_dqa::instrument::{InstrumentKind, InstrumentProfile};
use koa_dqa::locate::{FileLocator, staged_path};
use koa_dqa::pipeline::{RunStatus, read_file_list};

fn set_modified(path: &Path, when: DateTime<Utc>) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::from(when)).unwrap();
}

/// Purpose: only files written inside the night's 24-hour window are staged and archived
/// Benefit: reruns for one date never pick up the neighbouring nights
#[test]
fn test_locate_then_dqa() {
    let night = Night::new();
    let volume = night.temp.path().join("s");
    let locator = FileLocator::new(&InstrumentProfile::for_instrument(InstrumentKind::Esi))
        .with_search_dirs(vec![volume]);
    let (start, end) = locator.window(ut_date());

    let tonight = night.frame("e0001.fits", &FrameBuilder::esi_dark("07:00:00", 1));
    let also_tonight = night.frame("e0002.fits", &FrameBuilder::esi_dark("07:05:00", 2));
    let last_night = night.frame("e0000.fits", &FrameBuilder::esi_dark("06:00:00", 99));
    set_modified(&tonight, start + Duration::hours(12));
    set_modified(&also_tonight, end);
    set_modified(&last_night, start - Duration::minutes(5));

    let report = locator.locate(ut_date(), &night.dirs).unwrap();

    let expected = vec![
        staged_path(&night.dirs.stage, &tonight),
        staged_path(&night.dirs.stage, &also_tonight),
    ];
    assert_eq!(report.files, expected);
    assert_eq!(read_file_list(&report.list).unwrap(), expected);
    assert!(expected.iter().all(|p| p.exists()));

    let outcome = night.pipeline().run().unwrap();
    assert_eq!(outcome.status, RunStatus::Success(2));
    assert_eq!(outcome.batch.volumes, vec!["701".to_string()]);
    assert_eq!(outcome.batch.pis, vec!["Doe".to_string()]);
    assert_eq!(
        outcome.batch.identifiers(),
        vec!["EI.20190110.070000.fits", "EI.20190110.070500.fits"]
    );
}

/// Purpose: a staged copy is never overwritten by a second locate run
#[test]
fn test_second_locate_keeps_staged_copy() {
    let night = Night::new();
    let locator = FileLocator::new(&InstrumentProfile::for_instrument(InstrumentKind::Esi))
        .with_search_dirs(vec![night.raw.clone()]);
    let (_, end) = locator.window(ut_date());

    let raw = night.frame("e0001.fits", &FrameBuilder::esi_dark("07:00:00", 1));
    set_modified(&raw, end - Duration::hours(1));

    let first = locator.locate(ut_date(), &night.dirs).unwrap();
    let staged = first.files[0].clone();
    fs::write(&staged, b"edited in stage").unwrap();

    let second = locator.locate(ut_date(), &night.dirs).unwrap();
    assert_eq!(second.files, vec![staged.clone()]);
    assert_eq!(fs::read(&staged).unwrap(), b"edited in stage");
}
