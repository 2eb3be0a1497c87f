use clap::Parser;
use koa_dqa::cli::{args::Args, commands};
use std::process;

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    match commands::run(args) {
        Ok(_summary) => {
            // Success - the summary has already been reported by the command
            process::exit(0);
        }
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("KOA DQA - Keck Observatory Archive data quality assessment");
    println!("==========================================================");
    println!();
    println!("Locate one night of raw instrument FITS files, check their headers,");
    println!("assign archive identifiers and prepare them for ingestion.");
    println!();
    println!("USAGE:");
    println!("    koa-dqa <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    locate      Find and stage the night's FITS files");
    println!("    dqa         Run data quality assessment over the located files");
    println!("    help        Show this help message or help for specific commands");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Show help information");
    println!("    -V, --version    Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    # Stage the raw ESI files for a night:");
    println!("    koa-dqa locate --instrument ESI --utdate 2019-01-10");
    println!();
    println!("    # Run DQA and update run tracking:");
    println!("    koa-dqa dqa --instrument ESI --utdate 2019-01-10 --tpx -v");
    println!();
    println!("For detailed help on any command, use:");
    println!("    koa-dqa <COMMAND> --help");
}
