//! `sbxdec` — decode an SBX sidecar back into its original file.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{TimeZone, Utc};
use clap::Parser;

use sbxguard::container::{decode_file, read_metadata, DecodeOptions};

/// Decode an SBX container back into the original file.
#[derive(Parser)]
#[command(name = "sbxdec", version, about = "Decode an SBX sidecar back into a file")]
struct Cli {
    /// Sidecar to decode
    sidecar: PathBuf,

    /// Output path (defaults to the name stored in the sidecar's metadata)
    out: Option<PathBuf>,

    /// Container version
    #[arg(short = 's', long = "sbxver", value_name = "1|2", default_value = "1")]
    sv: u8,

    /// Overwrite the output file if it already exists
    #[arg(short = 'o', long = "overwrite")]
    overwrite: bool,

    /// Test only: verify decodability without writing output
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Print the sidecar's metadata and exit
    #[arg(short = 'i', long = "info")]
    info: bool,

    /// Continue past block errors instead of aborting
    #[arg(short = 'c', long = "continue")]
    cont: bool,

    /// Consult the `.sbx.raid` twin on block failure
    #[arg(long = "raid")]
    raid: bool,

    /// Password used at encode time, to reverse the XOR obfuscation
    #[arg(short = 'p', long = "password", value_name = "PASS")]
    password: Option<String>,

    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    sbxguard_cli_support::init_tracing(cli.verbose);

    if cli.info {
        return match read_metadata(&cli.sidecar, cli.sv, cli.raid) {
            Ok(meta) => {
                println!("sidecar:   {}", cli.sidecar.display());
                if let Some(name) = &meta.filename {
                    println!("filename:  {name}");
                }
                if let Some(sz) = meta.filesize {
                    println!("filesize:  {sz} B");
                }
                if let Some(t) = meta.filedatetime {
                    println!("file date: {}", Utc.timestamp_opt(t, 0).single().map(|d| d.to_rfc3339()).unwrap_or_default());
                }
                if let Some(t) = meta.sbxdatetime {
                    println!("sbx date:  {}", Utc.timestamp_opt(t, 0).single().map(|d| d.to_rfc3339()).unwrap_or_default());
                }
                if let Some(hash) = &meta.sha256 {
                    println!("sha256:    {}", hex::encode(hash));
                }
                if let Some(rsl) = meta.redundancy_level {
                    println!("rs level:  {rsl}");
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("sbxdec: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let out = if cli.test {
        std::env::temp_dir().join(format!("sbxdec-test-{}", std::process::id()))
    } else {
        match cli.out.clone() {
            Some(o) => o,
            None => match read_metadata(&cli.sidecar, cli.sv, cli.raid).ok().and_then(|m| m.filename) {
                Some(name) => PathBuf::from(name),
                None => {
                    eprintln!("sbxdec: sidecar carries no filename; pass an explicit <out>");
                    return ExitCode::FAILURE;
                }
            },
        }
    };

    if !cli.test && out.exists() && !cli.overwrite {
        eprintln!("sbxdec: {} already exists (use -o to overwrite)", out.display());
        return ExitCode::FAILURE;
    }

    let opts = DecodeOptions {
        version: cli.sv,
        raid: cli.raid,
        password: cli.password,
        overwrite: cli.overwrite || cli.test,
        continue_on_error: cli.cont,
    };

    let result = decode_file(&cli.sidecar, &out, &opts);
    if cli.test {
        let _ = std::fs::remove_file(&out);
    }

    match result {
        Ok(report) => {
            if !cli.test {
                println!(
                    "decoded {} -> {} ({} B, hash {})",
                    cli.sidecar.display(),
                    report.out_path.display(),
                    report.bytes_written,
                    if report.hash_verified { "verified" } else { "NOT verified" }
                );
            } else {
                println!("{}: decodable ({} B)", cli.sidecar.display(), report.bytes_written);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("sbxdec: {e}");
            ExitCode::FAILURE
        }
    }
}

#[path = "cli_support.rs"]
mod sbxguard_cli_support;
