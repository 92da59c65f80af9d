//! `sbxmount` — mount a transparent SBX-shielded mirror of a backing
//! directory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use sbxguard::mount::{self, MountOptions};

/// Mount a backing directory through an SBX-shielding FUSE mirror.
#[derive(Parser)]
#[command(name = "sbxmount", version, about = "Mount a transparent SBX-shielded mirror filesystem")]
struct Cli {
    /// Backing directory to mirror
    source: PathBuf,

    /// Mount point
    mountpoint: PathBuf,

    /// Container version used for sidecars written by this mount
    #[arg(short = 's', long = "sbxver", value_name = "1|2", default_value = "1")]
    sv: u8,

    /// Also maintain a `.sbx.raid` twin for every sidecar
    #[arg(long = "raid")]
    raid: bool,

    /// Obfuscate sidecar payloads with a password-derived keystream
    #[arg(short = 'p', long = "password", value_name = "PASS")]
    password: Option<String>,

    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    sbxguard_cli_support::init_tracing(cli.verbose);

    if !cli.source.is_dir() {
        eprintln!("sbxmount: {} is not a directory", cli.source.display());
        return ExitCode::FAILURE;
    }

    let opts = MountOptions { version: cli.sv, raid: cli.raid, password: cli.password };
    match mount::run(cli.source, cli.mountpoint, opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sbxmount: {e}");
            ExitCode::FAILURE
        }
    }
}

#[path = "cli_support.rs"]
mod sbxguard_cli_support;
