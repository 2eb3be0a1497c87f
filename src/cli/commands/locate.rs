//! Locate command implementation

use std::time::Instant;

use anyhow::Context;
use colored::*;
use indicatif::HumanDuration;
use tracing::info;

use crate::cli::args::LocateArgs;
use crate::cli::commands::shared::{RunSummary, load_configuration, setup_logging};
use crate::config::DqaConfig;
use crate::instrument::InstrumentProfile;
use crate::locate::{FileLocator, LocateReport};

/// Run the locate command
pub fn run_locate(args: LocateArgs) -> anyhow::Result<RunSummary> {
    let config = apply_cli_overrides(load_configuration(&args.night)?, &args);
    config.validate()?;

    let kind = args.night.instrument;
    let ut_date = args.night.utdate;
    let dirs = config.run_dirs(kind, ut_date);

    setup_logging(
        args.night.get_log_level(),
        args.night.quiet,
        Some(&dirs.log_file(kind, ut_date)),
    )?;
    info!("{} locate for {}", kind, ut_date);

    let started = Instant::now();
    let profile = InstrumentProfile::for_instrument(kind);
    let mut locator = FileLocator::new(&profile);
    if let Some(search_dirs) = &config.paths.search_dirs {
        locator = locator.with_search_dirs(search_dirs.clone());
    }

    let report = locator
        .locate(ut_date, &dirs)
        .with_context(|| format!("Locate failed for {} {}", kind, ut_date))?;
    let elapsed = started.elapsed();

    if !args.night.quiet {
        print_report(&report, elapsed);
    }

    Ok(RunSummary {
        instrument: kind.name().to_string(),
        ut_date: Some(ut_date),
        candidates: report.files.len(),
        processing_time: elapsed,
        ..Default::default()
    })
}

/// Apply locate-specific CLI arguments to configuration
pub fn apply_cli_overrides(config: DqaConfig, args: &LocateArgs) -> DqaConfig {
    if args.search_dirs.is_empty() {
        config
    } else {
        config.with_search_dirs(args.search_dirs.clone())
    }
}

fn print_report(report: &LocateReport, elapsed: std::time::Duration) {
    println!("\n🔭 {}", "Locate Complete!".green().bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📊 Locate Summary:");
    println!("   • Directories searched: {}", report.searched.len());
    println!("   • Files staged: {}", report.files.len().to_string().green());
    println!("   • File list: {}", report.list.display());
    println!("   • Processing time: {}", HumanDuration(elapsed));

    if report.searched.is_empty() {
        println!("\n⚠️  {}", "No data directories found".yellow());
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::{Args, Commands};
    use clap::Parser;
    use std::path::PathBuf;

    fn locate_args(extra: &[&str]) -> LocateArgs {
        let mut argv = vec!["koa-dqa", "locate", "-i", "NIRES", "-d", "2019-01-10"];
        argv.extend_from_slice(extra);
        match Args::try_parse_from(argv).unwrap().command {
            Some(Commands::Locate(locate)) => locate,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_search_dirs_override() {
        let config = apply_cli_overrides(DqaConfig::default(), &locate_args(&["--search-dir", "/raw"]));
        assert_eq!(config.paths.search_dirs, Some(vec![PathBuf::from("/raw")]));
    }

    #[test]
    fn test_no_search_dirs_keeps_config() {
        let base = DqaConfig::default().with_search_dirs(vec![PathBuf::from("/configured")]);
        let config = apply_cli_overrides(base, &locate_args(&[]));
        assert_eq!(config.paths.search_dirs, Some(vec![PathBuf::from("/configured")]));
    }
}
