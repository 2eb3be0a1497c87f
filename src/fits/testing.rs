//! FITS fixtures for unit tests

use std::fs;
use std::path::{Path, PathBuf};

use fitsio::images::{ImageDescription, ImageType};

use super::FitsFile;
use crate::header::Value;

/// Write a 2x2 16-bit primary image, then set `cards` on its header
pub fn write_image(path: &Path, pixels: &[i16], cards: &[(&str, Value)]) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
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
    let hdu = fits.hdu(0).unwrap();
    hdu.write_image(&mut fits, pixels).unwrap();
    drop(fits);

    let mut file = FitsFile::open(path).unwrap();
    for (keyword, value) in cards {
        file.header_mut().set(keyword, value.clone(), "");
    }
    file.write(path).unwrap();
    path.to_path_buf()
}

/// A bare header block with no data, for files cfitsio may refuse
pub fn write_raw_header(path: &Path, cards: &[&str]) {
    let mut block: Vec<u8> = cards
        .iter()
        .chain(std::iter::once(&"END"))
        .flat_map(|card| format!("{:<80}", card).into_bytes())
        .collect();
    block.resize(2880, b' ');
    fs::write(path, block).unwrap();
}
