//! Shared components for CLI commands
//!
//! Logging setup, layered configuration loading and progress reporting used
//! by both the locate and dqa commands.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::cli::args::NightArgs;
use crate::config::DqaConfig;
use crate::error::{DqaError, Result};

/// Counts reported at the end of a command
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub instrument: String,
    pub ut_date: Option<NaiveDate>,
    /// Files listed by locate or read by dqa
    pub candidates: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub processing_time: Duration,
}

/// Set up structured logging: stderr plus, when given, an append-only run log
pub fn setup_logging(log_level: &str, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("koa_dqa={}", log_level)));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| DqaError::output(parent, e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| DqaError::output(path, e))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_level(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    if quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Load configuration using layered approach (defaults -> file -> args).
/// Callers apply their own overrides and validate the result.
pub fn load_configuration(args: &NightArgs) -> Result<DqaConfig> {
    args.validate()?;

    let default_config_path = if args.config_file.is_none() {
        DqaConfig::default_config_path().ok()
    } else {
        None
    };

    let config_file = match &args.config_file {
        Some(path) => Some(path.as_path()),
        None => default_config_path
            .as_ref()
            .filter(|path| path.exists())
            .map(|path| path.as_path()),
    };

    if let Some(config_path) = config_file {
        info!("Using config file: {}", config_path.display());
    } else {
        info!("No config file found, using defaults");
    }

    let mut config = DqaConfig::load_layered(config_file)?;

    if let Some(root) = &args.root {
        config = config.with_root(root);
    }
    if let Some(stage) = &args.stage {
        config = config.with_stage(stage);
    }
    Ok(config)
}

/// Progress bar over the files of one run
pub fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} [{per_sec}] ETA: {eta}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::{Args, Commands};
    use clap::Parser;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn night(extra: &[&str]) -> NightArgs {
        let mut argv = vec!["koa-dqa", "locate", "-i", "ESI", "-d", "2019-01-10"];
        argv.extend_from_slice(extra);
        match Args::try_parse_from(argv).unwrap().command {
            Some(Commands::Locate(locate)) => locate.night,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[paths]\nroot = \"/from/file\"\nstage = \"/file/stage\"").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let config = load_configuration(&night(&["-c", &path, "--root", "/from/cli"])).unwrap();
        assert_eq!(config.paths.root, PathBuf::from("/from/cli"));
        assert_eq!(config.stage_root(), PathBuf::from("/file/stage"));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let result = load_configuration(&night(&["-c", "/nonexistent/koa.toml"]));
        assert!(matches!(result, Err(DqaError::Configuration { .. })));
    }

    #[test]
    fn test_progress_bar_length() {
        let pb = create_progress_bar(12);
        assert_eq!(pb.length(), Some(12));
    }
}
