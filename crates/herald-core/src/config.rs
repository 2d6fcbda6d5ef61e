use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HeraldError, Result};

/// Top-level configuration for Herald.
///
/// Loaded from `~/.herald/config.toml` by default. Each section tunes one
/// part of the orchestration pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl HeraldConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HeraldConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| HeraldError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Pending-batch session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long an unconfirmed batch survives.
    pub ttl_secs: u64,
    /// Expiry applied once to bulk batches so they outlive a long run.
    pub bulk_ttl_secs: u64,
    /// Batches with more actions than this are bulk.
    pub bulk_threshold: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            bulk_ttl_secs: 900,
            bulk_threshold: 5,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn bulk_ttl(&self) -> Duration {
        Duration::from_secs(self.bulk_ttl_secs)
    }

    pub fn is_bulk(&self, action_count: usize) -> bool {
        action_count > self.bulk_threshold
    }
}

/// Per-action retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further failure.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Per-tenant circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Pause applied when the breaker is open, before it resets.
    pub cooldown_secs: u64,
    /// Failures further apart than this do not count as consecutive.
    pub failure_window_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 30,
            failure_window_secs: 300,
        }
    }
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }
}

/// Inter-action pacing used to stay under the target platform's rate limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Settle time after an action whose result later actions depend on.
    pub dependent_delay_ms: u64,
    /// Settle time after an action nothing else depends on.
    pub independent_delay_ms: u64,
    /// Concurrent workers in the modification phase.
    pub modification_concurrency: usize,
    /// Pause each modification worker holds its slot for after an action.
    pub modification_stagger_ms: u64,
    /// Gap between two destructive actions.
    pub destructive_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            dependent_delay_ms: 1500,
            independent_delay_ms: 500,
            modification_concurrency: 3,
            modification_stagger_ms: 250,
            destructive_delay_ms: 1000,
        }
    }
}

impl PacingConfig {
    pub fn dependent_delay(&self) -> Duration {
        Duration::from_millis(self.dependent_delay_ms)
    }

    pub fn independent_delay(&self) -> Duration {
        Duration::from_millis(self.independent_delay_ms)
    }

    pub fn modification_stagger(&self) -> Duration {
        Duration::from_millis(self.modification_stagger_ms)
    }

    pub fn destructive_delay(&self) -> Duration {
        Duration::from_millis(self.destructive_delay_ms)
    }

    /// Zero-delay pacing, for dry runs and tests.
    pub fn immediate() -> Self {
        Self {
            dependent_delay_ms: 0,
            independent_delay_ms: 0,
            modification_concurrency: 3,
            modification_stagger_ms: 0,
            destructive_delay_ms: 0,
        }
    }
}

/// Pre/post execution validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub enabled: bool,
    /// Wait before reading platform state, to absorb read-after-write lag.
    pub settle_delay_ms: u64,
    /// Destructive actions skip validation in batches larger than this.
    pub skip_destructive_above: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settle_delay_ms: 500,
            skip_destructive_above: 5,
        }
    }
}

impl ValidationConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Final report presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Reports covering more actions than this carry the end-to-end note.
    pub note_threshold: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { note_threshold: 10 }
    }
}
