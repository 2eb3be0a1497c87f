//! Command-line argument definitions for the DQA tool
//!
//! Both subcommands work on one instrument night, identified by an instrument
//! name and a UT date. Arguments override values from the TOML configuration.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::error::{DqaError, Result};
use crate::instrument::InstrumentKind;

/// CLI arguments for the KOA data quality assessment tool
#[derive(Debug, Clone, Parser)]
#[command(
    name = "koa-dqa",
    version,
    about = "Locate and quality-check Keck instrument FITS files for archiving",
    long_about = "Prepares one night of raw Keck Observatory instrument data for the archive. \
                  The locate step stages the night's FITS files; the dqa step validates each \
                  file, assigns its archive identifier, attributes it to a scheduled program \
                  and writes the lev0 copies with their file list and extension tables."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Find and stage the night's FITS files
    Locate(LocateArgs),
    /// Run data quality assessment over the located files
    Dqa(DqaArgs),
}

/// Arguments shared by every command
#[derive(Debug, Clone, Parser)]
pub struct NightArgs {
    #[arg(
        short = 'i',
        long = "instrument",
        value_name = "NAME",
        help = "Instrument name (DEIMOS, ESI, NIRES, NIRSPEC, OSIRIS)"
    )]
    pub instrument: InstrumentKind,

    #[arg(
        short = 'd',
        long = "utdate",
        value_name = "DATE",
        value_parser = parse_ut_date,
        help = "UT date of the night (YYYY-MM-DD)"
    )]
    pub utdate: NaiveDate,

    /// TOML configuration file. Defaults to ~/.config/koa-dqa/config.toml when present.
    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    pub config_file: Option<PathBuf>,

    #[arg(long = "root", value_name = "PATH", help = "Root of the process directories")]
    pub root: Option<PathBuf>,

    #[arg(long = "stage", value_name = "PATH", help = "Root of the stage directories")]
    pub stage: Option<PathBuf>,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Only show errors. Overrides verbose settings.
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

#[derive(Debug, Clone, Parser)]
pub struct LocateArgs {
    #[command(flatten)]
    pub night: NightArgs,

    /// Replaces the instrument's built-in search directories. May be repeated.
    #[arg(
        long = "search-dir",
        value_name = "PATH",
        help = "Directory to search for raw files"
    )]
    pub search_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Parser)]
pub struct DqaArgs {
    #[command(flatten)]
    pub night: NightArgs,

    #[arg(long = "tpx", help = "Update run tracking records")]
    pub tpx: bool,

    /// Development run: tracking is still updated but no PI is notified
    #[arg(long = "dev", help = "Development run, no PI notifications")]
    pub dev: bool,

    #[arg(
        long = "schedule",
        value_name = "FILE",
        help = "Schedule file (defaults to dep_obtain<INSTR>.txt in the stage directory)"
    )]
    pub schedule: Option<PathBuf>,

    #[arg(
        long = "split-time",
        value_name = "HH:MM",
        help = "UT time splitting a two-program night"
    )]
    pub split_time: Option<String>,

    #[arg(
        long = "header-program",
        help = "Trust a PROGID already present in the raw headers"
    )]
    pub use_header_program: bool,

    #[arg(long = "previews", help = "Write a grayscale preview per output file")]
    pub previews: bool,
}

/// Parse `YYYY-MM-DD`, also accepting the compact `YYYYMMDD` form
pub fn parse_ut_date(value: &str) -> Result<NaiveDate> {
    let text = value.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y%m%d"))
        .map_err(|_| DqaError::InvalidDate {
            value: value.to_string(),
        })
}

impl NightArgs {
    /// Validate the shared arguments for consistency
    pub fn validate(&self) -> Result<()> {
        if let Some(config_file) = &self.config_file {
            if !config_file.exists() {
                return Err(DqaError::configuration(format!(
                    "Config file does not exist: {}",
                    config_file.display()
                )));
            }
        }
        Ok(())
    }

    /// Determine the appropriate log level based on verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Check if we should show progress bars (not in quiet mode)
    pub fn show_progress(&self) -> bool {
        !self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_ut_date() {
        let expected = NaiveDate::from_ymd_opt(2019, 1, 10).unwrap();
        assert_eq!(parse_ut_date("2019-01-10").unwrap(), expected);
        assert_eq!(parse_ut_date("20190110").unwrap(), expected);
        assert!(matches!(
            parse_ut_date("2019-13-01"),
            Err(DqaError::InvalidDate { .. })
        ));
        assert!(parse_ut_date("yesterday").is_err());
    }

    #[test]
    fn test_dqa_command() {
        let args = parse(&[
            "koa-dqa", "dqa", "-i", "esi", "-d", "2019-01-10", "--tpx", "--split-time", "10:30", "-vv",
        ]);
        let Some(Commands::Dqa(dqa)) = args.command else {
            panic!("expected dqa command");
        };
        assert_eq!(dqa.night.instrument, InstrumentKind::Esi);
        assert_eq!(dqa.night.utdate, NaiveDate::from_ymd_opt(2019, 1, 10).unwrap());
        assert!(dqa.tpx && !dqa.dev);
        assert_eq!(dqa.split_time.as_deref(), Some("10:30"));
        assert_eq!(dqa.night.get_log_level(), "debug");
        assert!(dqa.night.show_progress());
    }

    #[test]
    fn test_locate_command() {
        let args = parse(&[
            "koa-dqa",
            "locate",
            "--instrument",
            "NIRSPEC",
            "--utdate",
            "2019-01-10",
            "--search-dir",
            "/a",
            "--search-dir",
            "/b",
            "-q",
        ]);
        let Some(Commands::Locate(locate)) = args.command else {
            panic!("expected locate command");
        };
        assert_eq!(locate.night.instrument, InstrumentKind::Nirspec);
        assert_eq!(locate.search_dirs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(locate.night.get_log_level(), "error");
        assert!(!locate.night.show_progress());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Args::try_parse_from(["koa-dqa", "dqa", "-i", "HIRES", "-d", "2019-01-10"]).is_err());
        assert!(Args::try_parse_from(["koa-dqa", "dqa", "-i", "ESI", "-d", "Jan 10"]).is_err());
        assert!(Args::try_parse_from(["koa-dqa", "dqa", "-i", "ESI", "-d", "2019-01-10", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_validate_missing_config() {
        let args = parse(&["koa-dqa", "dqa", "-i", "ESI", "-d", "2019-01-10", "-c", "/nonexistent/koa.toml"]);
        let Some(Commands::Dqa(dqa)) = args.command else {
            panic!("expected dqa command");
        };
        assert!(dqa.night.validate().is_err());
    }

    #[test]
    fn test_no_command() {
        assert!(parse(&["koa-dqa"]).command.is_none());
    }
}
