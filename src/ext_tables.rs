//! Fixed-width dumps of tabular FITS extensions.
//!
//! Every ASCII `TABLE` or `BINTABLE` extension of every output file becomes
//! one `<stem>.ext<i>.<EXTNAME>.tbl` file beside it:
//!
//! ```text
//! \ Extended Header Name: TELEMETRY
//! |NAME  |VALUE      |
//! |char  |char       |
//! |      |           |
//! |      |           |
//!  alpha  1
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::constants::FITS_SUFFIX;
use crate::error::{DqaError, Result};
use crate::fits::{Column, Table, read_tables};

/// Render one decoded table in the fixed-width layout
pub fn render_table(name: &str, table: &Table) -> String {
    let mut out = format!("\\ Extended Header Name: {}\n", name);

    out.push_str(&header_line(table, |c| c.name.as_str()));
    out.push_str(&header_line(table, |_| "char"));
    out.push_str(&header_line(table, |_| ""));
    out.push_str(&header_line(table, |_| ""));

    for row in &table.rows {
        for (column, value) in table.columns.iter().zip(row) {
            out.push_str(&format!(" {:<width$}", value, width = column.width));
        }
        out.push('\n');
    }
    out
}

fn header_line<'a>(table: &'a Table, cell: impl Fn(&'a Column) -> &'a str) -> String {
    let mut line: String = table
        .columns
        .iter()
        .map(|c| format!("|{:<width$}", cell(c), width = c.width))
        .collect();
    line.push_str("|\n");
    line
}

/// Name of the table file for extension `index` of `fits_name`
pub fn table_file_name(fits_name: &str, index: usize, extname: &str) -> String {
    let stem = fits_name.strip_suffix(FITS_SUFFIX).unwrap_or(fits_name);
    format!("{}.ext{}.{}.tbl", stem, index, extname)
}

/// Write table files for every `*.fits` file directly under `dir`.
///
/// Existing `*.ext*.tbl` files are removed first. An extension that cannot be
/// decoded is logged and skipped; the remaining extensions are still written.
pub fn write_extension_tables(dir: &Path) -> Result<Vec<PathBuf>> {
    info!("Making FITS extension tables in {}", dir.display());
    remove_stale_tables(dir)?;

    let mut fits_files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(FITS_SUFFIX))
        })
        .collect();
    fits_files.sort();

    let mut written = Vec::new();
    for path in &fits_files {
        let extensions = match read_tables(path) {
            Ok(extensions) => extensions,
            Err(e) => {
                error!("Could not read {} for extension tables: {}", path.display(), e);
                continue;
            }
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        for extension in extensions {
            let (index, name) = (extension.index, extension.name);
            let table = match extension.table {
                Ok(table) => table,
                Err(e) => {
                    error!(
                        "Could not create extended header table for ext header index {} for file {}: {}",
                        index, file_name, e
                    );
                    continue;
                }
            };
            let out_path = dir.join(table_file_name(&file_name, index, &name));
            fs::write(&out_path, render_table(&name, &table))
                .map_err(|e| DqaError::output(&out_path, e))?;
            debug!("Wrote {}", out_path.display());
            written.push(out_path);
        }
    }
    Ok(written)
}

fn remove_stale_tables(dir: &Path) -> Result<()> {
    let pattern = dir.join("*.ext*.tbl");
    let pattern = pattern.to_string_lossy();
    let paths = glob::glob(&pattern)
        .map_err(|e| DqaError::configuration(format!("Bad table pattern {}: {}", pattern, e)))?;
    for path in paths.filter_map(|p| p.ok()) {
        if let Err(e) = fs::remove_file(&path) {
            warn!("Could not remove stale table {}: {}", path.display(), e);
        }
    }
    Ok(())
}
