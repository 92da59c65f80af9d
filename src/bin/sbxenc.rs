//! `sbxenc` — encode a file into an SBX sidecar.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use sbxguard::container::{encode_file, EncodeOptions};

/// Encode a file into an SBX container.
#[derive(Parser)]
#[command(name = "sbxenc", version, about = "Encode a file into an SBX sidecar")]
struct Cli {
    /// File to encode
    file: PathBuf,

    /// Sidecar path (defaults to `<file>.sbx`)
    sidecar: Option<PathBuf>,

    /// Container version
    #[arg(short = 's', long = "sbxver", value_name = "1|2", default_value = "1")]
    sv: u8,

    /// Overwrite the sidecar if it already exists
    #[arg(short = 'o', long = "overwrite")]
    overwrite: bool,

    /// Container UID: hex bytes (zero-padded/truncated to 6), or `r` for
    /// random (default)
    #[arg(long = "uid", value_name = "HEX|r")]
    uid: Option<String>,

    /// Also write a `.sbx.raid` twin copy
    #[arg(long = "raid")]
    raid: bool,

    /// Obfuscate block payloads with a password-derived keystream
    /// (NOT encryption — purely a confidentiality-by-obscurity bit-flip).
    #[arg(short = 'p', long = "password", value_name = "PASS")]
    password: Option<String>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Parse a `-uid` hex string into a 6-byte container uid, left-padding with
/// zero bytes (or keeping only the rightmost 6 bytes) when the string
/// decodes to fewer or more than 6 bytes: `(zeros ++ bytes)[-6:]`, same rule
/// the original tool applies rather than rejecting short/long uids outright.
fn parse_uid(s: &str) -> Result<Option<[u8; 6]>, String> {
    if s == "r" {
        return Ok(None);
    }
    let even_hex = if s.len() % 2 == 1 { format!("0{s}") } else { s.to_string() };
    let bytes = hex::decode(&even_hex).map_err(|e| format!("invalid -uid hex: {e}"))?;

    let mut padded = vec![0u8; 6];
    padded.extend_from_slice(&bytes);
    let arr: [u8; 6] = padded[padded.len() - 6..].try_into().unwrap();
    Ok(Some(arr))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    sbxguard_cli_support::init_tracing(cli.verbose);

    let uid = match cli.uid.as_deref().map(parse_uid).transpose() {
        Ok(uid) => uid.flatten(),
        Err(e) => {
            eprintln!("sbxenc: {e}");
            return ExitCode::FAILURE;
        }
    };

    let sidecar = cli.sidecar.unwrap_or_else(|| {
        let mut s = cli.file.clone().into_os_string();
        s.push(".sbx");
        PathBuf::from(s)
    });

    if sidecar.exists() && !cli.overwrite {
        eprintln!("sbxenc: {} already exists (use -o to overwrite)", sidecar.display());
        return ExitCode::FAILURE;
    }

    let opts = EncodeOptions { version: cli.sv, uid, password: cli.password, raid: cli.raid };
    match encode_file(&cli.file, &sidecar, &opts) {
        Ok(report) => {
            println!(
                "encoded {} -> {} ({} blocks, {} B, {:.2}% overhead)",
                cli.file.display(),
                report.sbx_path.display(),
                report.total_blocks,
                report.sbx_size,
                report.overhead_pct
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("sbxenc: {e}");
            ExitCode::FAILURE
        }
    }
}

#[path = "cli_support.rs"]
mod sbxguard_cli_support;
