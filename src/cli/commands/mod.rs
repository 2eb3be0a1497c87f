//! Command implementations for the DQA CLI
//!
//! Each subcommand lives in its own module:
//! - `locate`: find and stage the night's raw files
//! - `dqa`: quality-check the located files and write the archive outputs

pub mod dqa;
pub mod locate;
pub mod shared;

pub use shared::RunSummary;

use crate::cli::args::{Args, Commands};

/// Dispatch to the subcommand handler. `args.command` must be set.
pub fn run(args: Args) -> anyhow::Result<RunSummary> {
    match args.command {
        Some(Commands::Locate(locate_args)) => locate::run_locate(locate_args),
        Some(Commands::Dqa(dqa_args)) => dqa::run_dqa(dqa_args),
        None => anyhow::bail!("No command given"),
    }
}
