//! Preview images for accepted files.
//!
//! The archive expects one quick-look image per output file. Rendering sits
//! behind [`PreviewRenderer`] so runs that do not need previews (and tests)
//! can use [`NoPreview`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DqaError, Result};
use crate::fits::FitsFile;

/// Lower and upper clip fractions for the display stretch
const CLIP_LOW: f64 = 0.0025;
const CLIP_HIGH: f64 = 0.9975;

pub trait PreviewRenderer {
    /// Render a preview for `file` (already written to `output`) into
    /// `dir`. Returns the preview path, or `None` when nothing was rendered.
    fn render(&self, file: &FitsFile, output: &Path, dir: &Path) -> Result<Option<PathBuf>>;
}

/// Renders nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreview;

impl PreviewRenderer for NoPreview {
    fn render(&self, _file: &FitsFile, _output: &Path, _dir: &Path) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Writes an 8-bit binary PGM of the primary image with a clipped linear stretch
#[derive(Debug, Clone, Copy, Default)]
pub struct GrayscalePreview;

impl PreviewRenderer for GrayscalePreview {
    fn render(&self, file: &FitsFile, output: &Path, dir: &Path) -> Result<Option<PathBuf>> {
        let axes = file.primary.axes()?;
        let (width, height) = match axes.as_slice() {
            [w, h, ..] if *w > 0 && *h > 0 => (*w, *h),
            _ => {
                debug!("{} has no 2-D primary image; no preview", output.display());
                return Ok(None);
            }
        };
        let Some(pixels) = file.pixels.as_deref() else {
            return Ok(None);
        };
        let plane = &pixels[..(width * height).min(pixels.len())];
        let gray = stretch(plane);

        // FITS rows run bottom-up, image rows top-down
        let mut body = Vec::with_capacity(width * height);
        for row in (0..height).rev() {
            let start = row * width;
            let end = (start + width).min(gray.len());
            if start < end {
                body.extend_from_slice(&gray[start..end]);
            }
        }
        body.resize(width * height, 0);

        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "preview".to_string());
        let path = dir.join(format!("{}.pgm", stem));
        let mut bytes = format!("P5\n{} {}\n255\n", width, height).into_bytes();
        bytes.extend_from_slice(&body);
        fs::write(&path, bytes).map_err(|e| DqaError::output(&path, e))?;
        debug!("Wrote preview {}", path.display());
        Ok(Some(path))
    }
}

/// Map pixel values into 0..=255 between the clip percentiles
fn stretch(plane: &[f64]) -> Vec<u8> {
    let mut finite: Vec<f64> = plane.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return vec![0; plane.len()];
    }
    finite.sort_by(f64::total_cmp);
    let at = |q: f64| finite[((finite.len() - 1) as f64 * q).round() as usize];
    let (low, high) = (at(CLIP_LOW), at(CLIP_HIGH));
    let scale = if high > low { 255.0 / (high - low) } else { 0.0 };

    plane
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                0
            } else {
                ((v - low) * scale).clamp(0.0, 255.0).round() as u8
            }
        })
        .collect()
}
