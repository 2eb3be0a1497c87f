//! Batch pipeline tests over synthetic ESI frames

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;

use super::*;
use crate::fits::testing;
use crate::header::Value;
use crate::locate::staged_path;
use crate::registry::{ScheduleEntry, ScheduleProgramRegistry};

fn ut_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 1, 10).unwrap()
}

fn context() -> RunContext {
    let dqa_date =
        NaiveDateTime::parse_from_str("2019-01-11T02:03:04", "%Y-%m-%dT%H:%M:%S").unwrap();
    RunContext::new(ut_date(), dqa_date)
}

fn registry() -> Box<dyn ProgramRegistry> {
    let entry = ScheduleEntry::parse("2019-01-09 Jane esi3 Caltech Doe C123 Smith", 1).unwrap();
    Box::new(ScheduleProgramRegistry::new(vec![entry]))
}

struct Night {
    _temp: TempDir,
    raw: PathBuf,
    dirs: RunDirs,
}

impl Night {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let raw = temp.path().join("s/sdata701/esi3/2019jan10");
        std::fs::create_dir_all(&raw).unwrap();
        let dirs = RunDirs::new(
            &temp.path().join("koadata"),
            &temp.path().join("stage"),
            InstrumentKind::Esi,
            ut_date(),
        );
        Self {
            _temp: temp,
            raw,
            dirs,
        }
    }

    fn pipeline(&self) -> DqaPipeline {
        DqaPipeline::new(
            InstrumentProfile::for_instrument(InstrumentKind::Esi),
            context(),
            self.dirs.clone(),
            registry(),
        )
    }

    /// Write an ESI dark frame observed at `ut`
    fn frame(&self, name: &str, ut: &str, frameno: i64, extra: &[(&str, Value)]) -> PathBuf {
        let mut cards: Vec<(&str, Value)> = vec![
            ("INSTRUME", "ESI".into()),
            ("DATE-OBS", "2019-01-10".into()),
            ("UT", ut.into()),
            ("OUTFILE", "esi".into()),
            ("FRAMENO", frameno.into()),
            ("OBSTYPE", "Dark".into()),
        ];
        cards.extend(extra.iter().cloned());
        testing::write_image(&self.raw.join(name), &[10, 20, 30, 40], &cards)
    }
}

/// Cards that make an ESI frame classify as an on-sky object
fn science() -> Vec<(&'static str, Value)> {
    vec![
        ("OBSTYPE", "Object".into()),
        ("SLMSKNAM", "0.75_arcsec".into()),
        ("HATCHPOS", "open".into()),
        ("LAMPQTZ1", "off".into()),
        ("LAMPAR1", "off".into()),
        ("LAMPCU1", "off".into()),
        ("LAMPNE1", "off".into()),
        ("LAMPNE2", "off".into()),
        ("PRISMNAM", "in".into()),
        ("IMFLTNAM", "out".into()),
        ("LDFLTNAM", "out".into()),
        ("AXESTAT", "tracking".into()),
        ("DOMESTAT", "tracking".into()),
        ("EL", 60.0.into()),
        ("DWFILNAM", "clear".into()),
    ]
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[test]
fn test_run_dirs_layout() {
    let dirs = RunDirs::new(Path::new("/koadata"), Path::new("/stage"), InstrumentKind::Nires, ut_date());
    assert_eq!(dirs.process, PathBuf::from("/koadata/NIRES/20190110"));
    assert_eq!(dirs.lev0, PathBuf::from("/koadata/NIRES/20190110/lev0"));
    assert_eq!(dirs.udf, PathBuf::from("/koadata/NIRES/20190110/anc/udf"));
    assert_eq!(
        dirs.locate_list(InstrumentKind::Nires),
        PathBuf::from("/stage/NIRES/20190110/dep_locateNIRES.txt")
    );
    assert_eq!(
        dirs.file_table(ut_date()),
        PathBuf::from("/koadata/NIRES/20190110/lev0/20190110.filelist.table")
    );
    assert_eq!(
        dirs.log_file(InstrumentKind::Nires, ut_date()),
        PathBuf::from("/koadata/NIRES/20190110/dep_NIRES_20190110.log")
    );
}

#[test]
fn test_storage_volume() {
    assert_eq!(
        storage_volume(Path::new("/s/sdata701/esi3/2019jan10/e1.fits")).as_deref(),
        Some("701")
    );
    assert_eq!(
        storage_volume(Path::new("/stage/S/SDATA1501/nires1/x.fits")).as_deref(),
        Some("1501")
    );
    assert_eq!(storage_volume(Path::new("/stage/x.fits")), None);
}

#[test]
fn test_notifiable_semids() {
    let batch = BatchResult {
        semids: vec![
            "2018B_C123".to_string(),
            "2018B_ENG".to_string(),
            "2018B_NONE".to_string(),
            "2018B_null".to_string(),
            "2018B_".to_string(),
            "2019A_U456".to_string(),
        ],
        ..Default::default()
    };
    assert_eq!(batch.notifiable_semids(), vec!["2018B_C123", "2019A_U456"]);
}

#[test]
fn test_empty_lists_render_none() {
    let batch = BatchResult::default();
    assert_eq!(batch.pi_list(), "NONE");
    assert_eq!(batch.volume_list(), "NONE");
    assert_eq!(file_table(&batch), "    0 Total FITS files\n");
}

#[test]
fn test_duplicate_identifier_first_wins() {
    let night = Night::new();
    let first = night.frame("e0001.fits", "07:08:09.10", 1, &[]);
    let second = night.frame("e0002.fits", "07:08:09.90", 2, &[]);
    let third = night.frame("e0003.fits", "07:10:00.00", 3, &[]);

    let mut pipeline = night.pipeline();
    let batch = pipeline
        .process(&[first.clone(), second.clone(), third.clone()])
        .unwrap();

    assert_eq!(batch.accepted_paths(), vec![first.as_path(), third.as_path()]);
    assert_eq!(
        batch.identifiers(),
        vec!["EI.20190110.070809.fits", "EI.20190110.071000.fits"]
    );
    assert_eq!(batch.rejected.len(), 1);
    assert_eq!(batch.rejected[0].path, second);
    assert_eq!(batch.rejected[0].rejection.reason(), "duplicate identifier");
    assert!(night.dirs.udf.join("e0002.fits").exists());
    assert!(night.dirs.lev0.join("EI.20190110.070809.fits").exists());
}

#[test]
fn test_batch_aggregates() {
    let night = Night::new();
    let files = vec![
        night.frame("e0001.fits", "07:00:00", 1, &[]),
        night.frame("e0002.fits", "07:01:00", 2, &science()),
    ];
    let mut pipeline = night.pipeline();
    let batch = pipeline.process(&files).unwrap();

    assert_eq!(batch.accepted.len(), 2);
    assert_eq!(batch.volumes, vec!["701".to_string()]);
    assert_eq!(batch.pis, vec!["Doe".to_string()]);
    assert_eq!(batch.semids, vec!["2018B_C123".to_string()]);
    assert_eq!(batch.extra_meta["EI.20190110.070000.fits"]["PROGTITL"], "NONE");
    assert_eq!(batch.accepted[0].original_name(), "e0001.fits");
}

#[test]
fn test_unreadable_file_is_diverted() {
    let night = Night::new();
    let junk = night.raw.join("junk.fits");
    std::fs::write(&junk, b"not a fits file").unwrap();
    let good = night.frame("e0001.fits", "07:00:00", 1, &[]);

    let mut pipeline = night.pipeline();
    let batch = pipeline.process(&[junk, good]).unwrap();
    assert_eq!(batch.accepted.len(), 1);
    assert_eq!(batch.rejected[0].rejection.reason(), "bad header");
    assert!(night.dirs.udf.join("junk.fits").exists());
}

#[test]
fn test_rejects_with_the_same_name_are_both_kept() {
    let night = Night::new();
    let other = night.raw.parent().unwrap().parent().unwrap().join("esi2/2019jan10");
    std::fs::create_dir_all(&other).unwrap();
    let first = night.raw.join("e0001.fits");
    let second = other.join("e0001.fits");
    std::fs::write(&first, b"first").unwrap();
    std::fs::write(&second, b"second").unwrap();

    let mut pipeline = night.pipeline();
    let batch = pipeline.process(&[first, second.clone()]).unwrap();
    assert_eq!(batch.rejected.len(), 2);

    assert_eq!(read(&night.dirs.udf.join("e0001.fits")), "first");
    assert_eq!(read(&staged_path(&night.dirs.udf, &second)), "second");
}

#[test]
fn test_corrupt_axis_lengths_are_rejected() {
    let night = Night::new();
    let corrupt = night.raw.join("e0009.fits");
    testing::write_raw_header(
        &corrupt,
        &[
            "SIMPLE  =                    T",
            "BITPIX  =                   16",
            "NAXIS   =                    2",
            "NAXIS1  =  9000000000000000000",
            "NAXIS2  =  9000000000000000000",
        ],
    );
    let good = night.frame("e0001.fits", "07:00:00", 1, &[]);

    let mut pipeline = night.pipeline();
    let batch = pipeline.process(&[corrupt, good]).unwrap();
    assert_eq!(batch.accepted.len(), 1);
    assert_eq!(batch.rejected[0].rejection.reason(), "bad header");
    assert!(night.dirs.udf.join("e0009.fits").exists());
}

#[test]
fn test_missing_locate_list_is_fatal() {
    let night = Night::new();
    let err = night.pipeline().run().unwrap_err();
    assert!(matches!(err, DqaError::MissingInput { .. }));
}

#[test]
fn test_zero_files_marks_run_done() {
    let night = Night::new();
    night.dirs.create().unwrap();
    std::fs::write(night.dirs.locate_list(InstrumentKind::Esi), "").unwrap();
    let status_path = night.dirs.status_file(InstrumentKind::Esi);

    let outcome = night
        .pipeline()
        .with_tracker(Box::new(StatusFileTracker::new(&status_path)))
        .with_tpx(true)
        .run()
        .unwrap();

    assert_eq!(outcome.status, RunStatus::SuccessZero);
    assert_eq!(outcome.candidates, 0);
    assert_eq!(read(&night.dirs.dqa_list(InstrumentKind::Esi)), "");
    let record = StatusFileTracker::new(&status_path).load().unwrap();
    assert_eq!(record.fields["arch_stat"], "DONE");
    assert!(record.fields.contains_key("arch_time"));
}

#[test]
fn test_tracking_and_notification() {
    let night = Night::new();
    let files = vec![
        night.frame("e0001.fits", "07:00:00", 1, &science()),
        night.frame("e0002.fits", "07:01:00", 2, &[]),
    ];
    let listing: String = files.iter().map(|f| format!("{}\n", f.display())).collect();
    night.dirs.create().unwrap();
    std::fs::write(night.dirs.locate_list(InstrumentKind::Esi), listing).unwrap();
    let status_path = night.dirs.status_file(InstrumentKind::Esi);

    let outcome = night
        .pipeline()
        .with_tracker(Box::new(StatusFileTracker::new(&status_path)))
        .with_tpx(true)
        .run()
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Success(2));

    let record = StatusFileTracker::new(&status_path).load().unwrap();
    assert_eq!(record.fields["files_arch"], "2");
    assert_eq!(record.fields["sci_files"], "1");
    assert_eq!(record.fields["sdata"], "701");
    assert_eq!(record.fields["pi"], "Doe");
    assert_eq!(record.notified, vec!["2018B_C123".to_string()]);

    let table = read(&night.dirs.file_table(ut_date()));
    assert_eq!(
        table,
        "e0001.fits EI.20190110.070000.fits\ne0002.fits EI.20190110.070100.fits\n    2 Total FITS files\n"
    );
}

#[test]
fn test_dev_mode_skips_notification() {
    let night = Night::new();
    let file = night.frame("e0001.fits", "07:00:00", 1, &[]);
    night.dirs.create().unwrap();
    std::fs::write(
        night.dirs.locate_list(InstrumentKind::Esi),
        format!("{}\n", file.display()),
    )
    .unwrap();
    let status_path = night.dirs.status_file(InstrumentKind::Esi);

    night
        .pipeline()
        .with_tracker(Box::new(StatusFileTracker::new(&status_path)))
        .with_tpx(true)
        .with_dev(true)
        .run()
        .unwrap();

    let record = StatusFileTracker::new(&status_path).load().unwrap();
    assert_eq!(record.fields["files_arch"], "1");
    assert!(record.notified.is_empty());
}
