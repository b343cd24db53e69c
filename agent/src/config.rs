//! Configuration types for the hang watchdog

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_MS: u64 = 99;
const DEFAULT_SUSPICION_THRESHOLD_MS: u64 = 1000;
const DEFAULT_ANR_THRESHOLD_MS: u64 = 4000;

/// Module prefixes treated as runtime/framework code by default
pub const DEFAULT_SYSTEM_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "tokio::",
    "futures::",
    "futures_util::",
    "parking_lot::",
    "crossbeam",
    "libc",
];

/// Watchdog configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Time between two polls of the watched thread
    pub poll_interval_ms: u64,

    /// Heartbeat gap after which the watched thread is suspicious and sampling starts
    pub suspicion_threshold_ms: u64,

    /// Heartbeat gap after which the hang is confirmed
    pub anr_threshold_ms: u64,

    /// Maximum number of samples captured per hang episode
    pub max_samples: usize,

    /// Maximum number of samples kept on disk
    pub queue_capacity: usize,

    /// Module prefixes of runtime/framework code, checked in order
    pub system_prefixes: Vec<String>,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        let env_ms = |key: &str, default: u64| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };

        let poll_interval_ms = env_ms("ANRWATCH_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS);
        let anr_threshold_ms = env_ms("ANRWATCH_ANR_MS", DEFAULT_ANR_THRESHOLD_MS);
        // Enough samples to cover the whole window up to the ANR threshold
        let max_samples = (anr_threshold_ms / poll_interval_ms.max(1)).max(1) as usize;

        Self {
            poll_interval_ms,
            suspicion_threshold_ms: env_ms("ANRWATCH_SUSPICION_MS", DEFAULT_SUSPICION_THRESHOLD_MS),
            anr_threshold_ms,
            max_samples,
            queue_capacity: max_samples,
            system_prefixes: DEFAULT_SYSTEM_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl WatchdogConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn suspicion_threshold(&self) -> Duration {
        Duration::from_millis(self.suspicion_threshold_ms)
    }

    pub fn anr_threshold(&self) -> Duration {
        Duration::from_millis(self.anr_threshold_ms)
    }

    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(s).context("Failed to parse watchdog config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file in TOML format
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_ms == 0 {
            anyhow::bail!("Poll interval must be greater than 0");
        }

        if self.anr_threshold_ms <= self.suspicion_threshold_ms {
            anyhow::bail!(
                "ANR threshold ({}ms) must be greater than the suspicion threshold ({}ms)",
                self.anr_threshold_ms,
                self.suspicion_threshold_ms
            );
        }

        if self.max_samples == 0 {
            anyhow::bail!("Sample cap must be greater than 0");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("Queue capacity must be greater than 0");
        }

        Ok(())
    }
}
