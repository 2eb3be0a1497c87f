//! ASCII `TABLE` and `BINTABLE` extensions read as text cells through
//! cfitsio. Every column is read with `ffgcvs`, so cfitsio does the
//! formatting, applying TDISPn when the header carries it.

use std::ffi::CString;
use std::fs;
use std::os::raw::{c_char, c_int};
use std::path::Path;

use fitsio::errors::check_status as fits_check_status;
use fitsio::hdu::HduInfo;

use super::{FitsError, Result, keys};
use crate::header::{Header, Value};

const TSTRING: c_int = 16;
const TBIT: c_int = 1;
const TCOMPLEX: c_int = 83;
const TDBLCOMPLEX: c_int = 163;

/// Column name and display width
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub width: usize,
}

/// Table contents rendered as strings, one `Vec` per row
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<String>>,
}

/// One table extension of a file; `table` fails on its own so the other
/// extensions of the same file can still be used.
#[derive(Debug)]
pub struct TableExtension {
    /// HDU index, the primary being 0
    pub index: usize,
    pub name: String,
    pub table: Result<Table>,
}

/// Column layout as cfitsio reports it
struct ColumnLayout {
    colnum: c_int,
    /// Elements per cell; strings count whole strings, not characters
    per_row: usize,
    buffer_len: usize,
}

/// Every table extension of `path`, in HDU order
pub fn read_tables(path: &Path) -> Result<Vec<TableExtension>> {
    let file_len = fs::metadata(path)?.len();
    let mut fits = fitsio::FitsFile::open(path)?;
    let count = fits.iter().count();

    let mut tables = Vec::new();
    for index in 1..count {
        let hdu = fits.hdu(index)?;
        let rows = match hdu.info {
            HduInfo::TableInfo { num_rows, .. } => num_rows,
            _ => continue,
        };
        let header = keys::read_header(&mut fits)?;
        let name = header
            .get("EXTNAME")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string();
        let table = read_table(&mut fits, &header, rows, file_len).map_err(|e| match e {
            FitsError::Truncated { .. } => FitsError::Truncated { hdu: index },
            other => other,
        });
        tables.push(TableExtension { index, name, table });
    }
    Ok(tables)
}

fn read_table(fits: &mut fitsio::FitsFile, header: &Header, rows: usize, file_len: u64) -> Result<Table> {
    let tfields = header
        .get("TFIELDS")
        .and_then(Value::as_i64)
        .filter(|n| *n >= 0)
        .ok_or_else(|| FitsError::MissingKeyword {
            keyword: "TFIELDS".to_string(),
        })?;
    let row_len = header.get("NAXIS1").and_then(Value::as_i64).unwrap_or(0).max(0) as u64;
    match (rows as u64).checked_mul(row_len) {
        Some(bytes) if bytes <= file_len => {}
        _ => return Err(FitsError::Truncated { hdu: 0 }),
    }

    let mut columns = Vec::new();
    let mut layouts = Vec::new();
    for n in 1..=tfields as c_int {
        let (column, layout) = column_layout(fits, header, n)?;
        columns.push(column);
        layouts.push(layout);
    }

    let nulval = CString::default();
    let mut table_rows = Vec::with_capacity(rows);
    for row in 1..=rows as i64 {
        let mut cells = Vec::with_capacity(layouts.len());
        for layout in &layouts {
            cells.push(read_cell(fits, layout, row, &nulval)?);
        }
        table_rows.push(cells);
    }

    Ok(Table {
        columns,
        rows: table_rows,
    })
}

fn column_layout(fits: &mut fitsio::FitsFile, header: &Header, colnum: c_int) -> Result<(Column, ColumnLayout)> {
    let mut status = 0;
    let mut typecode: c_int = 0;
    let mut repeat: i64 = 0;
    let mut width: i64 = 0;
    let mut display: c_int = 0;
    unsafe {
        // ffgtclll = fits_get_coltypell
        fitsio_sys::ffgtclll(
            fits.as_raw(), /* I - FITS file pointer                  */
            colnum,        /* I - column number (1 = 1st column)     */
            &mut typecode, /* O - datatype code (21 = short, etc)    */
            &mut repeat,   /* O - repeat count of field              */
            &mut width,    /* O - if ASCII, width of field or unit   */
            &mut status,   /* IO - error status                      */
        );
    }
    fits_check_status(status)?;
    unsafe {
        // ffgcdw = fits_get_col_display_width
        fitsio_sys::ffgcdw(fits.as_raw(), colnum, &mut display, &mut status);
    }
    fits_check_status(status)?;

    if typecode < 0 || matches!(typecode, TBIT | TCOMPLEX | TDBLCOMPLEX) {
        return Err(FitsError::Table {
            reason: format!("column {} has unsupported type code {}", colnum, typecode),
        });
    }

    let repeat = repeat.max(1) as usize;
    let per_row = if typecode == TSTRING {
        (repeat / width.max(1) as usize).max(1)
    } else {
        repeat
    };
    let display = display.max(1) as usize;
    let name = header
        .get(&format!("TTYPE{}", colnum))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("col{}", colnum));
    let cell_width = display * per_row + per_row - 1;

    Ok((
        Column {
            width: cell_width.max(name.len()),
            name,
        },
        ColumnLayout {
            colnum,
            per_row,
            buffer_len: display.max(width.max(0) as usize).max(32) + 1,
        },
    ))
}

fn read_cell(fits: &mut fitsio::FitsFile, layout: &ColumnLayout, row: i64, nulval: &CString) -> Result<String> {
    let mut buffers = vec![vec![0 as c_char; layout.buffer_len]; layout.per_row];
    let mut pointers: Vec<*mut c_char> = buffers.iter_mut().map(|b| b.as_mut_ptr()).collect();
    let mut anynul: c_int = 0;
    let mut status = 0;
    unsafe {
        // ffgcvs = fits_read_col_str
        fitsio_sys::ffgcvs(
            fits.as_raw(),                    /* I - FITS file pointer                       */
            layout.colnum,                    /* I - number of column to read (1 = 1st col)  */
            row,                              /* I - first row to read (1 = 1st row)         */
            1,                                /* I - first vector element to read (1 = 1st)  */
            layout.per_row as i64,            /* I - number of strings to read               */
            nulval.as_ptr() as *mut c_char,   /* I - string for null pixels                  */
            pointers.as_mut_ptr(),            /* O - array of pointers to strings            */
            &mut anynul,                      /* O - set to 1 if any values are null; else 0 */
            &mut status,                      /* IO - error status                           */
        );
    }
    fits_check_status(status)?;

    let cell: Vec<String> = buffers
        .iter()
        .map(|b| {
            let bytes: Vec<u8> = b.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
            String::from_utf8_lossy(&bytes).trim().to_string()
        })
        .collect();
    Ok(cell.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::testing;
    use fitsio::images::{ImageDescription, ImageType};
    use fitsio::tables::{ColumnDataType, ColumnDescription};
    use tempfile::TempDir;

    fn write_tables(path: &Path) {
        testing::write_image(path, &[0; 4], &[]);
        let mut fits = fitsio::FitsFile::edit(path).unwrap();

        let description = ImageDescription {
            data_type: ImageType::Short,
            dimensions: &[2, 2],
        };
        fits.create_image("GUIDER".to_string(), &description).unwrap();

        let columns = [
            ColumnDescription::new("NAME")
                .with_type(ColumnDataType::String)
                .that_repeats(6)
                .create()
                .unwrap(),
            ColumnDescription::new("VALUE")
                .with_type(ColumnDataType::Int)
                .create()
                .unwrap(),
        ];
        let hdu = fits.create_table("SETUP".to_string(), &columns).unwrap();
        hdu.write_col(&mut fits, "NAME", &["alpha".to_string(), "beta".to_string()])
            .unwrap();
        hdu.write_col(&mut fits, "VALUE", &[7i32, -3]).unwrap();
    }

    #[test]
    fn test_read_bintable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("frame.fits");
        write_tables(&path);

        let tables = read_tables(&path).unwrap();
        assert_eq!(tables.len(), 1);
        let extension = &tables[0];
        assert_eq!(extension.index, 2);
        assert_eq!(extension.name, "SETUP");

        let table = extension.table.as_ref().unwrap();
        assert_eq!(
            table.columns,
            vec![
                Column { name: "NAME".into(), width: 6 },
                Column { name: "VALUE".into(), width: 11 },
            ]
        );
        assert_eq!(table.rows, vec![vec!["alpha", "7"], vec!["beta", "-3"]]);
    }

    #[test]
    fn test_image_only_file_has_no_tables() {
        let temp_dir = TempDir::new().unwrap();
        let path = testing::write_image(&temp_dir.path().join("frame.fits"), &[0; 4], &[]);
        assert!(read_tables(&path).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(read_tables(&temp_dir.path().join("absent.fits")).is_err());
    }
}
