use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (muster.toml + MUSTER_* env overrides).
///
/// Nested keys are addressed with a double underscore, e.g.
/// `MUSTER_DISCORD__BOT_TOKEN` or `MUSTER_HEALTH__FAILURE_THRESHOLD`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MusterConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub interactions: InteractionsConfig,
    #[serde(default)]
    pub countdown: CountdownConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Presence status: online / idle / dnd / invisible.
    #[serde(default = "default_status")]
    pub status: String,
    /// Optional "Watching ..." activity text.
    pub activity_name: Option<String>,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            status: default_status(),
            activity_name: None,
        }
    }
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_secs")]
    pub recovery_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_secs: default_recovery_secs(),
        }
    }
}

impl HealthConfig {
    pub fn recovery_window(&self) -> Duration {
        Duration::from_secs(self.recovery_secs)
    }
}

/// Backoff applied to every database round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound of the uniform random jitter added to each delay.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionsConfig {
    /// How long a claimed interaction id stays remembered.
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for InteractionsConfig {
    fn default() -> Self {
        Self {
            claim_ttl_secs: default_claim_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountdownConfig {
    /// Events that ended less than this many hours ago are still loaded at
    /// startup so their final "finished" edit can be applied.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
    /// Reload the publication list on this cadence; 0 disables resync.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
            resync_interval_secs: default_resync_interval_secs(),
            default_timezone: default_timezone(),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.muster/muster.db", home)
}
fn default_status() -> String {
    "online".to_string()
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_recovery_secs() -> u64 {
    60
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_jitter_ms() -> u64 {
    1_000
}
fn default_claim_ttl_secs() -> u64 {
    30
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_lookback_hours() -> i64 {
    24
}
fn default_resync_interval_secs() -> u64 {
    300
}
fn default_timezone() -> String {
    "UTC".to_string()
}

impl MusterConfig {
    /// Load config from a TOML file with MUSTER_* env var overrides.
    ///
    /// Uses the explicit path when given, otherwise `~/.muster/muster.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: MusterConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("MUSTER_").split("__"))
            .extract()
            .map_err(|e| crate::error::MusterError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.muster/muster.toml", home)
}
