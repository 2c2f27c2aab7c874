//! Global `tracing` subscriber: stderr, `RUST_LOG` first, then `info` (or `debug` with `--verbose`).

use std::io::IsTerminal;

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init(verbose: bool) -> Result<()> {
  let fallback = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(fallback))?;

  fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .with_ansi(std::io::stderr().is_terminal())
    .try_init()
    .map_err(|e| anyhow!("initializing logging: {}", e))
}
