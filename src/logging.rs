//! Tracing setup.
//!
//! The terminal is owned by the UI, so logs go to a file.  `RUST_LOG`
//! overrides the default `info` filter.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber, truncating `path`.
pub fn init(path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| anyhow::anyhow!("cannot install tracing subscriber: {e}"))?;

    tracing::info!(log_file = %path.display(), "tracing initialised");
    Ok(())
}
