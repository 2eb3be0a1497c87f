//! Dqa command implementation
//!
//! Builds the program registry from the night's schedule, wires the optional
//! run tracker and preview renderer into the pipeline and reports the result.

use anyhow::Context;
use chrono::Utc;
use colored::*;
use indicatif::HumanDuration;
use tracing::info;

use crate::cli::args::DqaArgs;
use crate::cli::commands::shared::{
    RunSummary, create_progress_bar, load_configuration, setup_logging,
};
use crate::config::DqaConfig;
use crate::instrument::{InstrumentProfile, RunContext};
use crate::pipeline::{
    DqaPipeline, GrayscalePreview, RunOutcome, RunStatus, StatusFileTracker, read_file_list,
};
use crate::registry::{ScheduleFile, ScheduleProgramRegistry};

/// Run the dqa command
pub fn run_dqa(args: DqaArgs) -> anyhow::Result<RunSummary> {
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
    info!("{} DQA for {} (tpx={}, dev={})", kind, ut_date, config.runtime.tpx, config.runtime.dev);

    let schedule = ScheduleFile::new(config.schedule_path(&dirs, kind));
    let registry = ScheduleProgramRegistry::from_schedule(&schedule, ut_date, kind.name())
        .with_split_time(config.split_time())
        .with_header_program(config.misc.use_header_program)
        .with_default_propint(Some(config.misc.default_propint));

    let context = RunContext::new(ut_date, Utc::now().naive_utc());
    let mut pipeline = DqaPipeline::new(
        InstrumentProfile::for_instrument(kind),
        context,
        dirs.clone(),
        Box::new(registry),
    )
    .with_tpx(config.runtime.tpx)
    .with_dev(config.runtime.dev);

    if config.runtime.tpx {
        pipeline = pipeline.with_tracker(Box::new(StatusFileTracker::new(
            config.status_path(&dirs, kind),
        )));
    }
    if config.output.write_previews {
        pipeline = pipeline.with_renderer(Box::new(GrayscalePreview));
    }

    let locate_list = dirs.locate_list(kind);
    if args.night.show_progress() && locate_list.exists() {
        let count = read_file_list(&locate_list)?.len();
        pipeline = pipeline.with_progress(create_progress_bar(count as u64));
    }

    let outcome = pipeline
        .run()
        .with_context(|| format!("DQA failed for {} {}", kind, ut_date))?;

    if !args.night.quiet {
        print_report(&outcome);
    }

    Ok(RunSummary {
        instrument: kind.name().to_string(),
        ut_date: Some(ut_date),
        candidates: outcome.candidates,
        accepted: outcome.batch.accepted.len(),
        rejected: outcome.batch.rejected.len(),
        processing_time: outcome.elapsed,
    })
}

/// Apply dqa-specific CLI arguments to configuration
pub fn apply_cli_overrides(mut config: DqaConfig, args: &DqaArgs) -> DqaConfig {
    if args.tpx {
        config = config.with_tpx(true);
    }
    if args.dev {
        config = config.with_dev(true);
    }
    if let Some(schedule) = &args.schedule {
        config = config.with_schedule(schedule);
    }
    if let Some(split_time) = &args.split_time {
        config = config.with_split_time(split_time);
    }
    if args.use_header_program {
        config = config.with_header_program(true);
    }
    if args.previews {
        config = config.with_previews(true);
    }
    config
}

fn print_report(outcome: &RunOutcome) {
    let batch = &outcome.batch;

    match outcome.status {
        RunStatus::Success(_) => println!("\n🎉 {}", "DQA Complete!".green().bold()),
        RunStatus::SuccessZero => println!("\n🎉 {}", "DQA Complete (no files)".yellow().bold()),
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📊 Run Summary:");
    println!("   • Files located: {}", outcome.candidates);
    println!("   • Files accepted: {}", batch.accepted.len().to_string().green());
    println!("   • Science files: {}", batch.science_files);
    println!("   • Programs: {}", batch.semids.join(", "));
    println!("   • PIs: {}", batch.pi_list());
    println!("   • Storage volumes: {}", batch.volume_list());
    println!("   • Processing time: {}", HumanDuration(outcome.elapsed));

    if !batch.rejected.is_empty() {
        println!("\n⚠️  Files rejected: {}", batch.rejected.len().to_string().red());
        for rejected in &batch.rejected {
            println!("   • {}: {}", rejected.path.display(), rejected.rejection);
        }
    }

    println!();
}
