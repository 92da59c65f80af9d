//! `sbxreco` — reassemble `.sbx` sidecars from a `sbxscan` catalog.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use sbxguard::recovery::{reconstruct, RecoOptions, RecoSelector};

/// Reassemble sidecars from a scan database produced by `sbxscan`.
#[derive(Parser)]
#[command(name = "sbxreco", version, about = "Reassemble SBX sidecars from a sbxscan catalog")]
struct Cli {
    /// Scan database produced by sbxscan
    db: PathBuf,

    /// Destination directory for reassembled sidecars
    #[arg(default_value = ".")]
    destdir: PathBuf,

    /// Reassemble every container found in the catalog
    #[arg(long = "all")]
    all: bool,

    /// Reassemble only the given container UID(s), as hex
    #[arg(long = "uid", value_name = "HEX", num_args = 1..)]
    uid: Vec<String>,

    /// Reassemble only containers whose sidecar name matches
    #[arg(long = "sbx", value_name = "NAME", num_args = 1..)]
    sbx: Vec<String>,

    /// Reassemble only containers whose original filename matches
    #[arg(long = "file", value_name = "NAME", num_args = 1..)]
    file: Vec<String>,

    /// Fill missing blocks with zeroed data rather than failing
    #[arg(short = 'f', long = "fill-missing")]
    fill_missing: bool,

    /// Print what would be reassembled and exit
    #[arg(short = 'i', long = "info")]
    info: bool,

    /// Overwrite sidecars that already exist in destdir
    #[arg(short = 'o', long = "overwrite")]
    overwrite: bool,

    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn build_selector(cli: &Cli) -> Result<RecoSelector, String> {
    if cli.all {
        return Ok(RecoSelector::All);
    }
    if !cli.uid.is_empty() {
        let uids = cli
            .uid
            .iter()
            .map(|s| {
                let bytes = hex::decode(s).map_err(|e| format!("invalid --uid hex '{s}': {e}"))?;
                bytes.as_slice().try_into().map_err(|_| format!("--uid '{s}' must be 6 bytes (12 hex digits)"))
            })
            .collect::<Result<Vec<[u8; 6]>, String>>()?;
        return Ok(RecoSelector::Uids(uids));
    }
    if !cli.sbx.is_empty() {
        return Ok(RecoSelector::SbxNames(cli.sbx.clone()));
    }
    if !cli.file.is_empty() {
        return Ok(RecoSelector::FileNames(cli.file.clone()));
    }
    Err("specify one of --all, --uid, --sbx, or --file".to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    sbxguard_cli_support::init_tracing(cli.verbose);

    let selector = match build_selector(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("sbxreco: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.info {
        println!("would reassemble into {} (fill_missing={})", cli.destdir.display(), cli.fill_missing);
        return ExitCode::SUCCESS;
    }

    let opts = RecoOptions { fill_missing: cli.fill_missing, overwrite: cli.overwrite };
    match reconstruct(&cli.db, &cli.destdir, &selector, &opts) {
        Ok(written) => {
            for path in &written {
                println!("reassembled {}", path.display());
            }
            println!("{} sidecar(s) reassembled", written.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("sbxreco: {e}");
            ExitCode::FAILURE
        }
    }
}

#[path = "cli_support.rs"]
mod sbxguard_cli_support;
