//! Command-line and environment configuration.
//!
//! The only required-at-runtime setting is the catalog API key, and even that
//! may be absent: feeds then publish `InvalidAddress` failures instead of the
//! process refusing to start.

use std::path::PathBuf;

use clap::Parser;

/// Default catalog API root.
pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";

#[derive(Debug, Parser)]
#[command(name = "cinefeed", version, about = "Browse movie catalog feeds in the terminal")]
pub struct Cli {
    /// Catalog API key.
    #[arg(long, env = "MOVIE_API", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Catalog API root that endpoint paths are appended to.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Where to write logs (the terminal belongs to the UI).
    #[arg(long, default_value = "cinefeed.log")]
    pub log_file: PathBuf,
}

/// Resolved settings handed to the catalog and logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `None` when unset or blank.
    pub api_key: Option<String>,
    pub base_url: String,
    pub log_file: PathBuf,
}

impl Config {
    /// Settings for the given API key and root, logging to the default file.
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.into(),
            log_file: PathBuf::from("cinefeed.log"),
        }
    }
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Self {
            log_file: cli.log_file,
            ..Self::new(cli.api_key, cli.base_url)
        }
    }
}
