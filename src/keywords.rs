//! Alias-aware typed access to header keywords.
//!
//! Every keyword the rule engine reads or writes is a [`Keyword`] variant.
//! Instruments that store a value under a different native name register an
//! alias; reads try the native name first and fall back to the canonical one,
//! writes always go to the canonical name.

use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use crate::constants::NULL_SENTINEL;
use crate::header::{Header, Value};

/// Canonical header keywords known to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    // Identification and timing
    Instrume,
    Instr,
    DateObs,
    Date,
    Utc,
    Koaid,
    Koaimtyp,
    Obstype,
    Elaptime,
    Itime,
    Truitime,
    Coadds,
    // File naming
    Frameno,
    Filenum,
    Filenum2,
    Imgnum,
    Outfile,
    Rootname,
    Filename,
    Ofname,
    Datafile,
    Outdir,
    // Program
    Semester,
    Progid,
    Progpi,
    Proginst,
    Progtitl,
    Propint,
    Oa,
    // Statistics and provenance
    Imagemn,
    Imagestd,
    Imagemd,
    Saturate,
    Npixsat,
    DqaVers,
    DqaDate,
    Datlevel,
    // Weather
    Wxdomhum,
    Wxdomtmp,
    Wxouthum,
    Wxouttmp,
    Wxpress,
    Wxwndir,
    Wxwndsp,
    Wxdewpnt,
    Guidfwhm,
    // Optical configuration
    Camera,
    Dispmode,
    Imfltnam,
    Ldfltnam,
    Prismnam,
    Slmsknam,
    Idfltnam,
    Dwfilnam,
    Hatchpos,
    Lampqtz1,
    Lampar1,
    Lampcu1,
    Lampne1,
    Lampne2,
    Axestat,
    Domestat,
    El,
    Filter,
    Echlpos,
    Slitname,
    Calmpos,
    Calppos,
    Calcpos,
    Xenon,
    Krypton,
    Argon,
    Neon,
    Flimagin,
    Flspectr,
    // Derived optics
    Wavered,
    Wavecntr,
    Waveblue,
    Slitlen,
    Slitwidt,
    Spatscal,
    Dispscal,
    Dispers,
    Specres,
    Isao,
    Detgain,
    Detrn,
}

impl Keyword {
    pub const WEATHER: [Keyword; 9] = [
        Keyword::Wxdomhum,
        Keyword::Wxdomtmp,
        Keyword::Wxouthum,
        Keyword::Wxouttmp,
        Keyword::Wxpress,
        Keyword::Wxwndir,
        Keyword::Wxwndsp,
        Keyword::Wxdewpnt,
        Keyword::Guidfwhm,
    ];

    /// Header name of the canonical keyword
    pub fn name(self) -> &'static str {
        use Keyword::*;
        match self {
            Instrume => "INSTRUME",
            Instr => "INSTR",
            DateObs => "DATE-OBS",
            Date => "DATE",
            Utc => "UTC",
            Koaid => "KOAID",
            Koaimtyp => "KOAIMTYP",
            Obstype => "OBSTYPE",
            Elaptime => "ELAPTIME",
            Itime => "ITIME",
            Truitime => "TRUITIME",
            Coadds => "COADDS",
            Frameno => "FRAMENO",
            Filenum => "FILENUM",
            Filenum2 => "FILENUM2",
            Imgnum => "IMGNUM",
            Outfile => "OUTFILE",
            Rootname => "ROOTNAME",
            Filename => "FILENAME",
            Ofname => "OFNAME",
            Datafile => "DATAFILE",
            Outdir => "OUTDIR",
            Semester => "SEMESTER",
            Progid => "PROGID",
            Progpi => "PROGPI",
            Proginst => "PROGINST",
            Progtitl => "PROGTITL",
            Propint => "PROPINT",
            Oa => "OA",
            Imagemn => "IMAGEMN",
            Imagestd => "IMAGESTD",
            Imagemd => "IMAGEMD",
            Saturate => "SATURATE",
            Npixsat => "NPIXSAT",
            DqaVers => "DQA_VERS",
            DqaDate => "DQA_DATE",
            Datlevel => "DATLEVEL",
            Wxdomhum => "WXDOMHUM",
            Wxdomtmp => "WXDOMTMP",
            Wxouthum => "WXOUTHUM",
            Wxouttmp => "WXOUTTMP",
            Wxpress => "WXPRESS",
            Wxwndir => "WXWNDIR",
            Wxwndsp => "WXWNDSP",
            Wxdewpnt => "WXDEWPNT",
            Guidfwhm => "GUIDFWHM",
            Camera => "CAMERA",
            Dispmode => "DISPMODE",
            Imfltnam => "IMFLTNAM",
            Ldfltnam => "LDFLTNAM",
            Prismnam => "PRISMNAM",
            Slmsknam => "SLMSKNAM",
            Idfltnam => "IDFLTNAM",
            Dwfilnam => "DWFILNAM",
            Hatchpos => "HATCHPOS",
            Lampqtz1 => "LAMPQTZ1",
            Lampar1 => "LAMPAR1",
            Lampcu1 => "LAMPCU1",
            Lampne1 => "LAMPNE1",
            Lampne2 => "LAMPNE2",
            Axestat => "AXESTAT",
            Domestat => "DOMESTAT",
            El => "EL",
            Filter => "FILTER",
            Echlpos => "ECHLPOS",
            Slitname => "SLITNAME",
            Calmpos => "CALMPOS",
            Calppos => "CALPPOS",
            Calcpos => "CALCPOS",
            Xenon => "XENON",
            Krypton => "KRYPTON",
            Argon => "ARGON",
            Neon => "NEON",
            Flimagin => "FLIMAGIN",
            Flspectr => "FLSPECTR",
            Wavered => "WAVERED",
            Wavecntr => "WAVECNTR",
            Waveblue => "WAVEBLUE",
            Slitlen => "SLITLEN",
            Slitwidt => "SLITWIDT",
            Spatscal => "SPATSCAL",
            Dispscal => "DISPSCAL",
            Dispers => "DISPERS",
            Specres => "SPECRES",
            Isao => "ISAO",
            Detgain => "DETGAIN",
            Detrn => "DETRN",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Native keyword names that stand in for canonical keywords
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasTable {
    native: HashMap<Keyword, &'static str>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, keyword: Keyword, native: &'static str) -> Self {
        self.native.insert(keyword, native);
        self
    }

    pub fn native(&self, keyword: Keyword) -> Option<&'static str> {
        self.native.get(&keyword).copied()
    }
}

/// Outcome of a typed keyword read
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<T> {
    Present(T),
    Absent,
    /// Keyword exists but its value cannot be read as the requested type
    Malformed { raw: String, reason: String },
}

impl<T> Resolved<T> {
    /// Collapse to an option; malformed values count as absent
    pub fn ok(self) -> Option<T> {
        match self {
            Resolved::Present(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Resolved::Present(_))
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Resolved::Malformed { .. })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        match self {
            Resolved::Present(v) => Resolved::Present(f(v)),
            Resolved::Absent => Resolved::Absent,
            Resolved::Malformed { raw, reason } => Resolved::Malformed { raw, reason },
        }
    }
}

/// Typed keyword access over one header with an instrument's alias table
pub struct KeywordResolver<'a> {
    header: &'a mut Header,
    aliases: &'a AliasTable,
}

impl<'a> KeywordResolver<'a> {
    pub fn new(header: &'a mut Header, aliases: &'a AliasTable) -> Self {
        Self { header, aliases }
    }

    /// Raw value, native alias first, then canonical name
    pub fn get(&self, keyword: Keyword) -> Option<&Value> {
        self.aliases
            .native(keyword)
            .and_then(|native| self.header.get(native))
            .or_else(|| self.header.get(keyword.name()))
    }

    /// Raw value under the canonical name only
    pub fn get_unaliased(&self, keyword: Keyword) -> Option<&Value> {
        self.header.get(keyword.name())
    }

    /// Any value rendered as text
    pub fn get_str(&self, keyword: Keyword) -> Resolved<String> {
        match self.get(keyword) {
            Some(Value::Str(s)) => Resolved::Present(s.clone()),
            Some(other) => Resolved::Present(other.to_string()),
            None => Resolved::Absent,
        }
    }

    /// Lower-cased text, empty when absent
    pub fn get_lower(&self, keyword: Keyword) -> String {
        self.get_str(keyword)
            .ok()
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default()
    }

    pub fn get_f64(&self, keyword: Keyword) -> Resolved<f64> {
        let resolved = match self.get(keyword) {
            None => Resolved::Absent,
            Some(Value::Int(i)) => Resolved::Present(*i as f64),
            Some(Value::Float(f)) => Resolved::Present(*f),
            Some(v) if v.is_null() => Resolved::Absent,
            Some(Value::Str(s)) => match s.trim().parse::<f64>() {
                Ok(f) => Resolved::Present(f),
                Err(e) => Resolved::Malformed {
                    raw: s.clone(),
                    reason: e.to_string(),
                },
            },
            Some(Value::Bool(b)) => Resolved::Malformed {
                raw: b.to_string(),
                reason: "logical value where a number was expected".to_string(),
            },
        };
        self.report(keyword, resolved)
    }

    pub fn get_i64(&self, keyword: Keyword) -> Resolved<i64> {
        let resolved = match self.get_f64(keyword) {
            Resolved::Present(f) if f.fract() == 0.0 => Resolved::Present(f as i64),
            Resolved::Present(f) => Resolved::Malformed {
                raw: f.to_string(),
                reason: "not an integer".to_string(),
            },
            Resolved::Absent => Resolved::Absent,
            Resolved::Malformed { raw, reason } => {
                return Resolved::Malformed { raw, reason };
            }
        };
        self.report(keyword, resolved)
    }

    /// Write under the canonical name, replacing any existing card
    pub fn set(&mut self, keyword: Keyword, value: impl Into<Value>, comment: &str) {
        self.header.set(keyword.name(), value, comment);
    }

    /// Write the `null` sentinel
    pub fn set_null(&mut self, keyword: Keyword, comment: &str) {
        self.set(keyword, NULL_SENTINEL, comment);
    }

    pub fn header(&self) -> &Header {
        self.header
    }

    fn report<T>(&self, keyword: Keyword, resolved: Resolved<T>) -> Resolved<T> {
        if let Resolved::Malformed { raw, reason } = &resolved {
            warn!("Keyword {} has unusable value '{}': {}", keyword, raw, reason);
        }
        resolved
    }
}
