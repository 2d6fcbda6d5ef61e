//! CLI argument definitions for the Herald application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Herald: stage, confirm and run a batch of community moderation actions
/// against a simulated platform.
#[derive(Parser, Debug)]
#[command(name = "herald", version, about)]
pub struct CliArgs {
    /// File with one action per line. Use `-` for stdin.
    pub actions: Option<PathBuf>,

    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Tenant (community) the batch runs against.
    #[arg(short = 't', long = "tenant", default_value = "local")]
    pub tenant: String,

    /// Approve the batch without prompting.
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,

    /// Print the report as JSON.
    #[arg(long = "json")]
    pub json: bool,

    /// Seed a member into the simulated platform. Repeatable.
    #[arg(long = "member")]
    pub members: Vec<String>,

    /// Seed a channel into the simulated platform. Repeatable.
    #[arg(long = "channel")]
    pub channels: Vec<String>,

    /// Seed a category into the simulated platform. Repeatable.
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// Seed a role into the simulated platform. Repeatable.
    #[arg(long = "role")]
    pub roles: Vec<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Write the default configuration to the config path and exit.
    #[arg(long = "init-config")]
    pub init_config: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > HERALD_CONFIG env var > platform default (~/.herald/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("HERALD_CONFIG") {
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

    /// Whether the actions are read from stdin, which rules out an
    /// interactive confirmation prompt.
    pub fn reads_stdin(&self) -> bool {
        self.actions
            .as_ref()
            .map(|p| p.as_os_str() == "-")
            .unwrap_or(true)
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".herald").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".herald").join("config.toml");
    }
    PathBuf::from("config.toml")
}
