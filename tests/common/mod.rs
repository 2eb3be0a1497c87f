//! Shared fixtures for the integration tests: a small FITS builder and a
//! temporary night layout mirroring the archive's raw-data volumes.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::tables::{ColumnDataType, ColumnDescription};
use koa_dqa::fits::FitsFile;
use koa_dqa::header::Value;
use koa_dqa::instrument::{InstrumentKind, InstrumentProfile, RunContext};
use koa_dqa::pipeline::{DqaPipeline, RunDirs};
use koa_dqa::registry::{ScheduleEntry, ScheduleProgramRegistry};
use tempfile::TempDir;

pub fn ut_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 1, 10).unwrap()
}

/// Fixed run clock so repeated runs stamp identical DQA_DATE values
pub fn context() -> RunContext {
    let dqa_date =
        NaiveDateTime::parse_from_str("2019-01-11T02:03:04", "%Y-%m-%dT%H:%M:%S").unwrap();
    RunContext::new(ut_date(), dqa_date)
}

pub fn schedule_line() -> &'static str {
    "2019-01-09 Jane esi3 Caltech Doe C123 Smith"
}

/// BINTABLE rows for [`FrameBuilder::telemetry`]
#[derive(Debug, Clone)]
struct Telemetry {
    extname: String,
    names: Vec<String>,
    values: Vec<i32>,
}

/// Builder for 2x2 16-bit FITS images with optional binary table extensions
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    cards: Vec<(String, Value)>,
    pixels: Vec<i16>,
    tables: Vec<Telemetry>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            cards: Vec::new(),
            pixels: vec![10, 20, 30, 40],
            tables: Vec::new(),
        }
    }

    /// ESI dark frame: the smallest header the ESI rules accept
    pub fn esi_dark(ut: &str, frameno: i64) -> Self {
        Self::new()
            .card("INSTRUME", "ESI")
            .card("DATE-OBS", "2019-01-10")
            .card("UT", ut)
            .card("OUTFILE", "esi")
            .card("FRAMENO", frameno)
            .card("OBSTYPE", "Dark")
    }

    /// ESI on-sky object taken in imaging mode through `filter`
    pub fn esi_imaging(ut: &str, frameno: i64, filter: &str) -> Self {
        Self::esi_dark(ut, frameno)
            .card("OBSTYPE", "Object")
            .card("SLMSKNAM", "0.75_arcsec")
            .card("HATCHPOS", "open")
            .card("LAMPQTZ1", "off")
            .card("LAMPAR1", "off")
            .card("LAMPCU1", "off")
            .card("LAMPNE1", "off")
            .card("LAMPNE2", "off")
            .card("PRISMNAM", "out")
            .card("IMFLTNAM", "in")
            .card("LDFLTNAM", "out")
            .card("AXESTAT", "tracking")
            .card("DOMESTAT", "tracking")
            .card("EL", 60.0)
            .card("DWFILNAM", filter)
    }

    /// Set or replace a primary header card
    pub fn card(mut self, keyword: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self.cards.iter_mut().find(|(k, _)| k == keyword) {
            Some(card) => card.1 = value,
            None => self.cards.push((keyword.to_string(), value)),
        }
        self
    }

    pub fn without(mut self, keyword: &str) -> Self {
        self.cards.retain(|(k, _)| k != keyword);
        self
    }

    /// Append a BINTABLE with an `8A` NAME column and a `J` VALUE column
    pub fn telemetry(mut self, extname: &str, rows: &[(&str, i32)]) -> Self {
        self.tables.push(Telemetry {
            extname: extname.to_string(),
            names: rows.iter().map(|(name, _)| name.to_string()).collect(),
            values: rows.iter().map(|(_, value)| *value).collect(),
        });
        self
    }

    /// Create the file with cfitsio, then set the header cards through the
    /// crate's own writer
    pub fn write(&self, path: &Path) -> PathBuf {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        if path.exists() {
            fs::remove_file(path).unwrap();
        }
        let description = ImageDescription {
            data_type: ImageType::Short,
            dimensions: &[2, 2],
        };
        let mut fits = fitsio::FitsFile::create(path)
            .with_custom_primary(&description)
            .open()
            .unwrap();
        let primary = fits.hdu(0).unwrap();
        primary.write_image(&mut fits, &self.pixels).unwrap();

        for table in &self.tables {
            let columns = [
                ColumnDescription::new("NAME")
                    .with_type(ColumnDataType::String)
                    .that_repeats(8)
                    .create()
                    .unwrap(),
                ColumnDescription::new("VALUE")
                    .with_type(ColumnDataType::Int)
                    .create()
                    .unwrap(),
            ];
            let hdu = fits.create_table(table.extname.clone(), &columns).unwrap();
            hdu.write_col(&mut fits, "NAME", &table.names).unwrap();
            hdu.write_col(&mut fits, "VALUE", &table.values).unwrap();
        }
        drop(fits);

        let mut file = FitsFile::open(path).unwrap();
        for (keyword, value) in &self.cards {
            file.header_mut().set(keyword, value.clone(), "");
        }
        file.write(path).unwrap();
        path.to_path_buf()
    }
}

/// Raw volume, stage and process directories for one ESI night
pub struct Night {
    pub temp: TempDir,
    pub raw: PathBuf,
    pub dirs: RunDirs,
}

impl Night {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let raw = temp.path().join("s/sdata701/esi3/2019jan10");
        fs::create_dir_all(&raw).unwrap();
        let dirs = RunDirs::new(
            &temp.path().join("koadata"),
            &temp.path().join("stage"),
            InstrumentKind::Esi,
            ut_date(),
        );
        Self { temp, raw, dirs }
    }

    pub fn frame(&self, name: &str, builder: &FrameBuilder) -> PathBuf {
        builder.write(&self.raw.join(name))
    }

    /// Write the locate list the dqa step reads
    pub fn locate_list(&self, files: &[PathBuf]) {
        self.dirs.create().unwrap();
        let listing: String = files.iter().map(|f| format!("{}\n", f.display())).collect();
        fs::write(self.dirs.locate_list(InstrumentKind::Esi), listing).unwrap();
    }

    pub fn pipeline(&self) -> DqaPipeline {
        let entry = ScheduleEntry::parse(schedule_line(), 1).unwrap();
        DqaPipeline::new(
            InstrumentProfile::for_instrument(InstrumentKind::Esi),
            context(),
            self.dirs.clone(),
            Box::new(ScheduleProgramRegistry::new(vec![entry])),
        )
    }

    pub fn output(&self, koaid: &str) -> FitsFile {
        FitsFile::open(&self.dirs.lev0.join(koaid)).unwrap()
    }
}

pub fn text(file: &FitsFile, keyword: &str) -> String {
    file.header()
        .get(keyword)
        .map(|v| v.to_string())
        .unwrap_or_default()
}
