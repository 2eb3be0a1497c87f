//! Header cards through cfitsio.
//!
//! Reading walks every record of the current HDU with `ffgkyn` and folds
//! CONTINUE records back into the long string they extend. Writing goes
//! through the `ffuky*` family, which updates a card in place or appends it
//! before END; strings that do not fit one card use the long-string
//! convention (`ffukls`).

use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::CString;
use std::os::raw::{c_char, c_int};

use fitsio::errors::check_status as fits_check_status;
use tracing::warn;

use super::Result;
use crate::header::{Card, Header, Value};

// `ffc2s` is exported by cfitsio but not bound by `fitsio-sys`.
unsafe extern "C" {
    fn ffc2s(instr: *const c_char, outstr: *mut c_char, status: *mut c_int) -> c_int;
}

const FLEN_KEYWORD: usize = 75;
const FLEN_CARD: usize = 81;
const FLEN_VALUE: usize = 71;
const FLEN_COMMENT: usize = 73;

/// Longest quoted string value that fits in a single card
const MAX_SHORT_STRING: usize = 68;

/// Read every card of the current HDU
pub fn read_header(fits: &mut fitsio::FitsFile) -> Result<Header> {
    let mut status = 0;
    let mut nexist: c_int = 0;
    let mut nmore: c_int = 0;
    unsafe {
        // ffghsp = fits_get_hdrspace
        fitsio_sys::ffghsp(
            fits.as_raw(), /* I - FITS file pointer                     */
            &mut nexist,   /* O - number of existing keywords in header */
            &mut nmore,    /* O - how many more keywords will fit       */
            &mut status,   /* IO - error status                         */
        );
    }
    fits_check_status(status)?;

    let mut cards: Vec<Card> = Vec::with_capacity(nexist.max(0) as usize);
    for keynum in 1..=nexist {
        let mut keyname = [0 as c_char; FLEN_KEYWORD];
        let mut value = [0 as c_char; FLEN_VALUE];
        let mut comment = [0 as c_char; FLEN_COMMENT];
        unsafe {
            // ffgkyn = fits_read_keyn
            fitsio_sys::ffgkyn(
                fits.as_raw(),         /* I - FITS file pointer             */
                keynum,                /* I - number of the keyword to read */
                keyname.as_mut_ptr(),  /* O - name of the keyword           */
                value.as_mut_ptr(),    /* O - keyword value                 */
                comment.as_mut_ptr(),  /* O - keyword comment               */
                &mut status,           /* IO - error status                 */
            );
        }
        fits_check_status(status)?;

        let keyword = from_buffer(&keyname);
        let keyword = keyword
            .strip_prefix("HIERARCH ")
            .map(str::to_string)
            .unwrap_or(keyword);

        if keyword == "CONTINUE" {
            let record = read_record(fits, keynum)?;
            if let Some(Value::Str(text)) = cards.last_mut().and_then(|c| c.value.as_mut()) {
                if text.ends_with('&') {
                    if let Some(rest) = continued_text(&record)? {
                        text.pop();
                        text.push_str(&rest);
                        continue;
                    }
                }
            }
            cards.push(Card::new(keyword, None, record.get(8..).unwrap_or("")));
            continue;
        }

        let value = parse_value(&from_buffer(&value))?;
        cards.push(Card::new(keyword, value, from_buffer(&comment)));
    }
    Ok(Header::from_cards(cards))
}

/// Apply the difference between `original` and `updated` to the current HDU.
/// Returns the number of records written or deleted.
pub fn update_header(fits: &mut fitsio::FitsFile, original: &Header, updated: &Header) -> Result<usize> {
    let mut changed = 0;

    for card in updated.cards().iter().filter(|c| !c.is_commentary()) {
        let before = original.card(&card.keyword);
        if before == Some(card) {
            continue;
        }
        let was_long = before
            .and_then(|c| c.value.as_ref())
            .and_then(Value::as_str)
            .is_some_and(is_long_string);
        update_key(fits, card, was_long)?;
        changed += 1;
    }

    for keyword in original.keywords() {
        if !updated.contains(keyword) {
            delete_key(fits, keyword)?;
            changed += 1;
        }
    }

    // Commentary cards are only ever appended
    let mut existing: HashMap<(&str, &str), usize> = HashMap::new();
    for card in original.cards().iter().filter(|c| c.is_commentary()) {
        *existing.entry((card.keyword.as_str(), card.comment.as_str())).or_default() += 1;
    }
    for card in updated.cards().iter().filter(|c| c.is_commentary()) {
        match existing.get_mut(&(card.keyword.as_str(), card.comment.as_str())) {
            Some(n) if *n > 0 => *n -= 1,
            _ => {
                append_commentary(fits, &card.keyword, &card.comment)?;
                changed += 1;
            }
        }
    }

    Ok(changed)
}

/// Write one keyword card, replacing the existing one if present
pub fn update_key(fits: &mut fitsio::FitsFile, card: &Card, was_long: bool) -> Result<()> {
    let mut status = 0;
    let keyword = CString::new(card.keyword.as_str())?;
    let comment = CString::new(printable(&card.keyword, &card.comment).as_ref())?;

    match &card.value {
        Some(Value::Str(text)) => {
            let text = printable(&card.keyword, text);
            let long = was_long || is_long_string(&text);
            let value = CString::new(text.as_ref())?;
            unsafe {
                if long {
                    // ffukls = fits_update_key_longstr
                    fitsio_sys::ffukls(
                        fits.as_raw(),                      /* I - FITS file pointer  */
                        keyword.as_ptr() as *mut c_char,    /* I - keyword name       */
                        value.as_ptr() as *mut c_char,      /* I - keyword value      */
                        comment.as_ptr() as *mut c_char,    /* I - keyword comment    */
                        &mut status,                        /* IO - error status      */
                    );
                } else {
                    // ffukys = fits_update_key_str
                    fitsio_sys::ffukys(
                        fits.as_raw(),
                        keyword.as_ptr() as *mut c_char,
                        value.as_ptr() as *mut c_char,
                        comment.as_ptr() as *mut c_char,
                        &mut status,
                    );
                }
            }
        }
        Some(Value::Int(i)) => unsafe {
            // ffukyj = fits_update_key_lng
            fitsio_sys::ffukyj(
                fits.as_raw(),
                keyword.as_ptr() as *mut c_char,
                *i,
                comment.as_ptr() as *mut c_char,
                &mut status,
            );
        },
        Some(Value::Float(f)) if f.is_finite() => unsafe {
            // ffukyd = fits_update_key_dbl, -15 selects %.15G
            fitsio_sys::ffukyd(
                fits.as_raw(),
                keyword.as_ptr() as *mut c_char,
                *f,
                -15,
                comment.as_ptr() as *mut c_char,
                &mut status,
            );
        },
        Some(Value::Float(f)) => {
            warn!("{} = {} is not a finite number; writing it as text", card.keyword, f);
            let text = Card::new(card.keyword.as_str(), Some(Value::Str(f.to_string())), card.comment.as_str());
            return update_key(fits, &text, was_long);
        }
        Some(Value::Bool(b)) => unsafe {
            // ffukyl = fits_update_key_log
            fitsio_sys::ffukyl(
                fits.as_raw(),
                keyword.as_ptr() as *mut c_char,
                c_int::from(*b),
                comment.as_ptr() as *mut c_char,
                &mut status,
            );
        },
        None => unsafe {
            // ffukyu = fits_update_key_null
            fitsio_sys::ffukyu(
                fits.as_raw(),
                keyword.as_ptr() as *mut c_char,
                comment.as_ptr() as *mut c_char,
                &mut status,
            );
        },
    }
    fits_check_status(status)?;
    Ok(())
}

pub fn delete_key(fits: &mut fitsio::FitsFile, keyword: &str) -> Result<()> {
    let mut status = 0;
    let keyword = CString::new(keyword)?;
    unsafe {
        // ffdkey = fits_delete_key; removes trailing CONTINUE records too
        fitsio_sys::ffdkey(fits.as_raw(), keyword.as_ptr() as *mut c_char, &mut status);
    }
    fits_check_status(status)?;
    Ok(())
}

pub fn append_commentary(fits: &mut fitsio::FitsFile, keyword: &str, text: &str) -> Result<()> {
    let mut status = 0;
    let text = printable(keyword, text);
    match keyword {
        "HISTORY" => {
            let text = CString::new(text.as_ref())?;
            unsafe {
                // ffphis = fits_write_history
                fitsio_sys::ffphis(fits.as_raw(), text.as_ptr() as *mut c_char, &mut status);
            }
        }
        "COMMENT" => {
            let text = CString::new(text.as_ref())?;
            unsafe {
                // ffpcom = fits_write_comment
                fitsio_sys::ffpcom(fits.as_raw(), text.as_ptr() as *mut c_char, &mut status);
            }
        }
        _ => {
            let record: String = format!("{:<8}{}", keyword, text).chars().take(FLEN_CARD - 1).collect();
            let record = CString::new(record)?;
            unsafe {
                // ffprec = fits_write_record
                fitsio_sys::ffprec(fits.as_raw(), record.as_ptr() as *mut c_char, &mut status);
            }
        }
    }
    fits_check_status(status)?;
    Ok(())
}

/// FITS headers hold printable ASCII only. Anything else becomes '?', with a
/// warning so the altered value can be traced.
pub fn printable<'a>(keyword: &str, text: &'a str) -> Cow<'a, str> {
    if text.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
        return Cow::Borrowed(text);
    }
    let replaced: String = text
        .chars()
        .map(|c| if (' '..='~').contains(&c) { c } else { '?' })
        .collect();
    warn!(
        "{}: non-ASCII characters replaced, '{}' written as '{}'",
        keyword, text, replaced
    );
    Cow::Owned(replaced)
}

/// Typed value of a raw value field. Quoted strings are unescaped by cfitsio;
/// a field cfitsio cannot classify is kept as text.
pub fn parse_value(raw: &str) -> Result<Option<Value>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let field = CString::new(raw)?;
    let mut dtype: c_char = 0;
    let mut status = 0;
    unsafe {
        // ffdtyp = fits_get_keytype
        fitsio_sys::ffdtyp(field.as_ptr() as *mut c_char, &mut dtype, &mut status);
    }
    if status != 0 {
        return Ok(Some(Value::Str(raw.to_string())));
    }

    let value = match dtype as u8 {
        b'C' => Value::Str(unquote(raw)?),
        b'L' => Value::Bool(raw == "T"),
        b'I' => match raw.parse::<i64>() {
            Ok(i) => Value::Int(i),
            Err(_) => parse_float(raw).map_or_else(|| Value::Str(raw.to_string()), Value::Float),
        },
        b'F' => parse_float(raw).map_or_else(|| Value::Str(raw.to_string()), Value::Float),
        _ => Value::Str(raw.to_string()),
    };
    Ok(Some(value))
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.replace(['D', 'd'], "E").parse().ok()
}

fn unquote(quoted: &str) -> Result<String> {
    let input = CString::new(quoted)?;
    let mut output = vec![0 as c_char; quoted.len() + 1];
    let mut status = 0;
    unsafe {
        // ffc2s = fits_read_string, strips quotes and trailing blanks
        ffc2s(input.as_ptr(), output.as_mut_ptr(), &mut status);
    }
    fits_check_status(status)?;
    Ok(from_buffer(&output))
}

/// Quotes are doubled when written, so they count twice
fn is_long_string(text: &str) -> bool {
    text.len() + text.matches('\'').count() > MAX_SHORT_STRING
}

fn read_record(fits: &mut fitsio::FitsFile, keynum: c_int) -> Result<String> {
    let mut card = [0 as c_char; FLEN_CARD];
    let mut status = 0;
    unsafe {
        // ffgrec = fits_read_record
        fitsio_sys::ffgrec(fits.as_raw(), keynum, card.as_mut_ptr(), &mut status);
    }
    fits_check_status(status)?;
    Ok(from_buffer(&card))
}

/// Quoted text of a CONTINUE record, `None` when it carries no string
fn continued_text(record: &str) -> Result<Option<String>> {
    let body = record.get(8..).unwrap_or("").trim_start();
    if !body.starts_with('\'') {
        return Ok(None);
    }
    // Closing quote is the first single quote not doubled
    let bytes = body.as_bytes();
    let mut end = None;
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            end = Some(i);
            break;
        }
        i += 1;
    }
    match end {
        Some(end) => unquote(&body[..=end]).map(Some),
        None => Ok(None),
    }
}

fn from_buffer(buffer: &[c_char]) -> String {
    let bytes: Vec<u8> = buffer
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}
