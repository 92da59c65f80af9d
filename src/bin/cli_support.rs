//! Shared tracing-subscriber wiring for the `sbx*` binaries, included by
//! each one via `#[path = "cli_support.rs"]`. `-v` bumps verbosity one
//! notch per repeat; `RUST_LOG` always wins when set, matching the
//! `tracing_subscriber::EnvFilter` convention used by `fuser`-based CLIs.

use tracing_subscriber::EnvFilter;

pub fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}
