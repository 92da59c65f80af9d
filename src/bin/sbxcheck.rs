//! `sbxcheck` — walk a folder, compare live files against their SBX
//! sidecars, and optionally repair drift.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use sbxguard::checker::{check_directory, CheckOptions, CheckStatus};

/// Scan a folder for integrity drift between files and their `.sbx` sidecars.
#[derive(Parser)]
#[command(name = "sbxcheck", version, about = "Check and optionally repair SBX-shielded files")]
struct Cli {
    /// Folder to scan
    folder: PathBuf,

    /// Recurse into subdirectories
    #[arg(short = 'r', long = "recursive")]
    recursive: bool,

    /// Container version
    #[arg(short = 's', long = "sbxver", value_name = "1|2", default_value = "1")]
    sv: u8,

    /// Consult the `.sbx.raid` twin on block failure
    #[arg(long = "raid")]
    raid: bool,

    /// Repair any mismatch by decoding the sidecar back over the live file
    #[arg(long = "auto")]
    auto: bool,

    /// Password used at encode time
    #[arg(short = 'p', long = "password", value_name = "PASS")]
    password: Option<String>,

    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    sbxguard_cli_support::init_tracing(cli.verbose);

    let opts = CheckOptions {
        version: cli.sv,
        raid: cli.raid,
        password: cli.password,
        recursive: cli.recursive,
        auto: cli.auto,
    };

    let report = match check_directory(&cli.folder, &opts) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("sbxcheck: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut had_trouble = false;
    for check in &report.checked {
        match &check.status {
            CheckStatus::Ok => println!("OK       {}", check.path.display()),
            CheckStatus::Repaired => println!("REPAIRED {}", check.path.display()),
            CheckStatus::Mismatch => {
                had_trouble = true;
                println!("MISMATCH {}", check.path.display());
            }
            CheckStatus::Error(msg) => {
                had_trouble = true;
                println!("ERROR    {}: {msg}", check.path.display());
            }
        }
    }

    println!(
        "{} file(s) checked, {} repaired, {} mismatch(es), {} error(s)",
        report.checked.len(),
        report.repaired_count(),
        report.mismatches().count(),
        report.errors().count()
    );

    if had_trouble { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

#[path = "cli_support.rs"]
mod sbxguard_cli_support;
