//! CLI argument definitions for the Butler application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Butler: plans and executes smart-home actions for one request.
#[derive(Parser, Debug)]
#[command(name = "butler", version, about)]
pub struct CliArgs {
    /// Natural-language request text.
    pub request: String,

    /// Identity the request is made on behalf of.
    #[arg(short = 'i', long = "identity", default_value = "guest")]
    pub identity: String,

    /// Room or area the request came from.
    #[arg(long = "location")]
    pub location: Option<String>,

    /// JSON scenario describing the simulated planner and home.
    #[arg(short = 's', long = "scenario")]
    pub scenario: Option<PathBuf>,

    /// Approve the confirmation raised by this request, if any.
    #[arg(long = "confirm", conflicts_with = "reject")]
    pub confirm: bool,

    /// Decline the confirmation raised by this request, if any.
    #[arg(long = "reject")]
    pub reject: bool,

    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > BUTLER_CONFIG env var > platform default (~/.butler/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("BUTLER_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".butler").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".butler").join("config.toml");
    }
    PathBuf::from("config.toml")
}
