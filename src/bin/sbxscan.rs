//! `sbxscan` — forward-scan arbitrary files or raw devices for candidate
//! SBX blocks and record them into a SQLite catalog.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use sbxguard::recovery::scan_into_db;

/// Scan files/devices for SBX blocks and record them into a SQLite DB.
#[derive(Parser)]
#[command(name = "sbxscan", version, about = "Scan files or devices for recoverable SBX blocks")]
struct Cli {
    /// Files or raw devices to scan
    #[arg(required = true, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Output catalog database
    #[arg(short = 'd', long = "db", default_value = "sbxscan.db")]
    db: PathBuf,

    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    sbxguard_cli_support::init_tracing(cli.verbose);

    match scan_into_db(&cli.files, &cli.db) {
        Ok(summary) => {
            println!(
                "scanned {} source(s): {} block(s), {} metadata block(s) -> {}",
                summary.sources_scanned,
                summary.blocks_found,
                summary.meta_blocks_found,
                cli.db.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("sbxscan: {e}");
            ExitCode::FAILURE
        }
    }
}

#[path = "cli_support.rs"]
mod sbxguard_cli_support;
