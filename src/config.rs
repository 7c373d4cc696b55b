//! Gateway Settings
//!
//! Typed configuration for the poll engine: timing knobs, validation
//! bounds, and store expiries. Loadable from a JSON5 file with every
//! field optional.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Errors loading the settings file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] json5::Error),
}

/// Poll engine settings. Defaults match the observed production values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    /// How often the public view is re-rendered, in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Per-user cooldown between vote submissions, in seconds
    #[serde(default = "default_vote_cooldown")]
    pub vote_cooldown_secs: u64,
    /// Delay between termination and deletion of poll state, in seconds
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
    /// Hard cutoff after which an abandoned poll's refresh loop stops
    #[serde(default = "default_safety_cutoff")]
    pub safety_cutoff_secs: u64,
    /// Store expiry for polls without a time limit, in seconds
    #[serde(default = "default_expiry")]
    pub default_expiry_secs: u64,
    /// Minimum number of options per poll
    #[serde(default = "default_min_options")]
    pub min_options: usize,
    /// Maximum number of options per poll
    #[serde(default = "default_max_options")]
    pub max_options: usize,
    /// Shortest allowed auto-end time limit, in seconds
    #[serde(default = "default_min_time_limit")]
    pub min_time_limit_secs: u64,
    /// Longest allowed auto-end time limit, in seconds
    #[serde(default = "default_max_time_limit")]
    pub max_time_limit_secs: u64,
    /// Consecutive store failures before a refresh loop gives up
    #[serde(default = "default_store_failure_limit")]
    pub store_failure_limit: u32,
}

fn default_refresh_interval() -> u64 {
    5
}

fn default_vote_cooldown() -> u64 {
    3
}

fn default_grace_period() -> u64 {
    3600
}

fn default_safety_cutoff() -> u64 {
    86_400
}

fn default_expiry() -> u64 {
    86_400
}

fn default_min_options() -> usize {
    2
}

fn default_max_options() -> usize {
    24
}

fn default_min_time_limit() -> u64 {
    10
}

fn default_max_time_limit() -> u64 {
    3600
}

fn default_store_failure_limit() -> u32 {
    3
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            vote_cooldown_secs: default_vote_cooldown(),
            grace_period_secs: default_grace_period(),
            safety_cutoff_secs: default_safety_cutoff(),
            default_expiry_secs: default_expiry(),
            min_options: default_min_options(),
            max_options: default_max_options(),
            min_time_limit_secs: default_min_time_limit(),
            max_time_limit_secs: default_max_time_limit(),
            store_failure_limit: default_store_failure_limit(),
        }
    }
}

impl PollSettings {
    /// Load settings from a JSON5 file; absent fields keep defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(json5::from_str(&raw)?)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn vote_cooldown(&self) -> Duration {
        Duration::from_secs(self.vote_cooldown_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn safety_cutoff(&self) -> Duration {
        Duration::from_secs(self.safety_cutoff_secs)
    }

    pub fn default_expiry(&self) -> Duration {
        Duration::from_secs(self.default_expiry_secs)
    }
}
