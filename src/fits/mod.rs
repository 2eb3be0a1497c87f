//! FITS file access on top of cfitsio.
//!
//! [`FitsFile::open`] loads every HDU header into a [`Header`] together with
//! the primary image as `f64` pixels (BSCALE/BZERO applied). Writing copies
//! the source file and then updates only the primary header cards that
//! changed, so data units are never re-encoded.

use std::fs;
use std::path::{Path, PathBuf};

use fitsio::hdu::HduInfo;
use thiserror::Error;
use tracing::debug;

use crate::header::Header;

pub mod keys;
pub mod table;

#[cfg(test)]
pub(crate) mod testing;

pub use table::{Column, Table, TableExtension, read_tables};

#[derive(Error, Debug)]
pub enum FitsError {
    #[error("cfitsio: {0}")]
    Fitsio(#[from] fitsio::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Header text contains a NUL byte: {0}")]
    BadString(#[from] std::ffi::NulError),

    #[error("HDU {hdu} declares more data than the file holds")]
    Truncated { hdu: usize },

    #[error("Invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("Missing mandatory keyword {keyword}")]
    MissingKeyword { keyword: String },

    #[error("Unsupported table layout: {reason}")]
    Table { reason: String },

    #[error("No source file to copy data units from")]
    NoSource,
}

pub type Result<T> = std::result::Result<T, FitsError>;

/// HDU layout as reported by cfitsio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HduKind {
    Image,
    Table { rows: usize },
    Other,
}

impl From<&HduInfo> for HduKind {
    fn from(info: &HduInfo) -> Self {
        match info {
            HduInfo::ImageInfo { .. } => HduKind::Image,
            HduInfo::TableInfo { num_rows, .. } => HduKind::Table { rows: *num_rows },
            _ => HduKind::Other,
        }
    }
}

/// One header/data unit
#[derive(Debug, Clone, PartialEq)]
pub struct Hdu {
    pub header: Header,
    pub kind: HduKind,
}

impl Hdu {
    pub fn new(header: Header, kind: HduKind) -> Self {
        Self { header, kind }
    }

    /// Axis lengths NAXIS1..NAXISn
    pub fn axes(&self) -> Result<Vec<usize>> {
        let naxis = required_int(&self.header, "NAXIS")?;
        (1..=naxis)
            .map(|i| required_int(&self.header, &format!("NAXIS{}", i)))
            .collect()
    }

    /// Data unit size in bytes, `None` when the header's sizes overflow
    fn data_bytes(&self) -> Result<Option<u64>> {
        let bitpix = self
            .header
            .get("BITPIX")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| FitsError::MissingKeyword {
                keyword: "BITPIX".to_string(),
            })?;
        let axes = self.axes()?;
        if axes.is_empty() {
            return Ok(Some(0));
        }
        let elements = axes
            .iter()
            .try_fold(1u64, |acc, &n| acc.checked_mul(n as u64));
        Ok(elements.and_then(|n| n.checked_mul(bitpix.unsigned_abs() / 8)))
    }
}

/// A FITS file: headers of every HDU plus the primary image
#[derive(Debug, Clone, PartialEq)]
pub struct FitsFile {
    pub path: PathBuf,
    pub primary: Hdu,
    pub extensions: Vec<Hdu>,
    /// Primary image pixels, `None` when there is no data array
    pub pixels: Option<Vec<f64>>,
    /// Primary header as read; a write only touches cards that differ from it
    original: Header,
}

impl FitsFile {
    /// File held only in memory. It cannot be written until it has a source.
    pub fn new(path: impl Into<PathBuf>, header: Header, pixels: Option<Vec<f64>>) -> Self {
        Self {
            path: path.into(),
            primary: Hdu::new(header, HduKind::Image),
            extensions: Vec::new(),
            pixels,
            original: Header::new(),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file_len = fs::metadata(path)?.len();
        let mut fits = fitsio::FitsFile::open(path)?;
        let count = fits.iter().count();

        let mut hdus = Vec::with_capacity(count);
        for index in 0..count {
            let hdu = fits.hdu(index)?;
            let kind = HduKind::from(&hdu.info);
            let header = keys::read_header(&mut fits)?;
            hdus.push(Hdu::new(header, kind));
        }
        let mut hdus = hdus.into_iter();
        let primary = hdus.next().ok_or_else(|| FitsError::MissingKeyword {
            keyword: "SIMPLE".to_string(),
        })?;

        let pixels = match primary.data_bytes()? {
            None => return Err(FitsError::Truncated { hdu: 0 }),
            Some(0) => None,
            Some(needed) if needed > file_len => return Err(FitsError::Truncated { hdu: 0 }),
            Some(_) => {
                let hdu = fits.hdu(0)?;
                let pixels: Vec<f64> = hdu.read_image(&mut fits)?;
                Some(pixels)
            }
        };

        let extensions: Vec<Hdu> = hdus.collect();
        debug!(
            "Read {} ({} extensions)",
            path.display(),
            extensions.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            original: primary.header.clone(),
            primary,
            extensions,
            pixels,
        })
    }

    /// Primary header only, without reading any data
    pub fn primary_header(path: &Path) -> Result<Header> {
        let mut fits = fitsio::FitsFile::open(path)?;
        fits.hdu(0)?;
        keys::read_header(&mut fits)
    }

    pub fn header(&self) -> &Header {
        &self.primary.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.primary.header
    }

    /// All HDUs, primary first
    pub fn hdus(&self) -> impl Iterator<Item = &Hdu> {
        std::iter::once(&self.primary).chain(self.extensions.iter())
    }

    /// Copy the source file to `output` and apply the primary header changes
    pub fn write(&self, output: &Path) -> Result<()> {
        if self.path.as_os_str().is_empty() || !self.path.exists() {
            return Err(FitsError::NoSource);
        }
        if self.path != output {
            // Read and rewrite rather than fs::copy so a read-only raw file
            // does not produce a read-only output.
            fs::write(output, fs::read(&self.path)?)?;
        }

        let mut fits = fitsio::FitsFile::edit(output)?;
        fits.hdu(0)?;
        let changed = keys::update_header(&mut fits, &self.original, &self.primary.header)?;
        debug!("Wrote {} ({} cards updated)", output.display(), changed);
        Ok(())
    }
}

fn required_int(header: &Header, keyword: &str) -> Result<usize> {
    match header.get(keyword).and_then(|v| v.as_i64()) {
        Some(v) => usize::try_from(v).map_err(|_| FitsError::InvalidHeader {
            reason: format!("{} = {}", keyword, v),
        }),
        None => Err(FitsError::MissingKeyword {
            keyword: keyword.to_string(),
        }),
    }
}
