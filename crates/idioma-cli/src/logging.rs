//! Diagnostic logging on stderr through `tracing-subscriber`.
//!
//! `RUST_LOG` wins when set. Otherwise the level follows the verbosity
//! flags: warnings by default, `-v` for info, `-vv` for debug, `-vvv` for
//! trace, `-q` for errors only.

use std::io;

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

fn level_for(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbose, quiet)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow!("logging setup failed: {err}"))
}
