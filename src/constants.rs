//! Application constants for the DQA pipeline
//!
//! Sentinels, default values, file naming patterns and the comment text
//! written alongside derived header keywords.

// =============================================================================
// Sentinels and Defaults
// =============================================================================

/// Value written when a derived keyword is legitimately indeterminate
pub const NULL_SENTINEL: &str = "null";

/// Image type written when no classification rule matches
pub const UNDEFINED_IMAGE_TYPE: &str = "undefined";

/// Program fields written when no program information is available
pub const NO_PROGRAM: &str = "NONE";

/// Proprietary period in months when the registry has none
pub const DEFAULT_PROPINT: i64 = 18;

/// Version stamped into DQA_VERS
pub const DQA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Raw data level written into DATLEVEL
pub const RAW_DATA_LEVEL: i64 = 0;

/// Default end-of-night cutoff (UT) for instruments that do not override it
pub const DEFAULT_END_OF_NIGHT: &str = "20:00:00";

/// Default saturation level in ADU
pub const DEFAULT_SATURATION: f64 = 65535.0;

/// Program ids that never trigger a PI notification
pub const NON_NOTIFY_PROGRAMS: &[&str] = &["NONE", "null", "ENG", ""];

/// Engineering program id assigned to files under an engineering account
pub const ENGINEERING_PROGRAM: &str = "ENG";

// =============================================================================
// File Naming
// =============================================================================

/// Archive file suffix
pub const FITS_SUFFIX: &str = ".fits";

/// Locate step output, relative to the stage directory
pub fn locate_list_name(instrument: &str) -> String {
    format!("dep_locate{}.txt", instrument)
}

/// Accepted-file list, relative to the stage directory
pub fn dqa_list_name(instrument: &str) -> String {
    format!("dep_dqa{}.txt", instrument)
}

/// Schedule file written by the obtain step
pub fn schedule_file_name(instrument: &str) -> String {
    format!("dep_obtain{}.txt", instrument)
}

/// Per-run log file name
pub fn log_file_name(instrument: &str, ut_date_compact: &str) -> String {
    format!("dep_{}_{}.log", instrument, ut_date_compact)
}

/// Substrings that exclude a path from the locate step
pub const LOCATE_EXCLUSIONS: &[&str] = &["/fcs", "mira", "savier-protected", "idf"];

// =============================================================================
// Run Tracking
// =============================================================================

pub mod tracking {
    pub const FILES_ARCHIVED: &str = "files_arch";
    pub const PI_LIST: &str = "pi";
    pub const VOLUMES: &str = "sdata";
    pub const SCIENCE_FILES: &str = "sci_files";
    pub const ARCHIVE_STATUS: &str = "arch_stat";
    pub const ARCHIVE_TIME: &str = "arch_time";
    pub const DONE: &str = "DONE";
    /// Format of the `arch_time` stamp
    pub const TIME_FORMAT: &str = "%Y%m%d %H:%M";
}

// =============================================================================
// Keyword Comments
// =============================================================================

pub mod comments {
    pub const KOAID: &str = "KOA: Data file name";
    pub const KOAIMTYP: &str = "KOA: Image type";
    pub const DATE_OBS: &str = "KOA: Observation date";
    pub const UTC: &str = "KOA: UTC keyword corrected";
    pub const FRAMENO: &str = "KOA: Image frame number";
    pub const OFNAME: &str = "KOA: Original file name";
    pub const SEMESTER: &str = "KOA: Calculated SEMESTER from DATE-OBS";
    pub const PROGID: &str = "KOA: Program ID";
    pub const PROGPI: &str = "KOA: Program principal investigator";
    pub const PROGINST: &str = "KOA: Program institution";
    pub const PROGTITL: &str = "KOA: Program title";
    pub const PROPINT: &str = "KOA: Proprietary period in months";
    pub const IMAGEMN: &str = "KOA: Image data mean";
    pub const IMAGESTD: &str = "KOA: Image data standard deviation";
    pub const IMAGEMD: &str = "KOA: Image data median";
    pub const WEATHER: &str = "KOA: Weather keyword";
    pub const OA: &str = "KOA: Observing Assistant name";
    pub const SATURATE: &str = "KOA: Saturation level";
    pub const NPIXSAT: &str = "KOA: Number of saturated pixels";
    pub const DQA_VERS: &str = "KOA: Data quality assess code version";
    pub const DQA_DATE: &str = "KOA: Data quality assess time";
    pub const DATLEVEL: &str = "KOA: Data reduction level";
    pub const ELAPTIME: &str = "KOA: Total integration time";
    pub const INSTRUME: &str = "KOA: Instrument";
    pub const DISPMODE: &str = "KOA: Dispersion mode";
    pub const CAMERA: &str = "KOA: Camera mode";
    pub const WAVERED: &str = "KOA: Red end wavelength";
    pub const WAVECNTR: &str = "KOA: Center wavelength";
    pub const WAVEBLUE: &str = "KOA: Blue end wavelength";
    pub const SLITLEN: &str = "KOA: Slit length projected on sky";
    pub const SLITWIDT: &str = "KOA: Slit width projected on sky";
    pub const SPATSCAL: &str = "KOA: Spatial pixel scale";
    pub const DISPSCAL: &str = "KOA: Dispersion pixel scale";
    pub const DISPERS: &str = "KOA: Dispersion";
    pub const SPECRES: &str = "KOA: Nominal spectral resolution";
    pub const ISAO: &str = "KOA: Adaptive optics was used";
    pub const DETGAIN: &str = "KOA: Detector gain";
    pub const DETRN: &str = "KOA: Detector read noise";
}
