//! Bridge configuration.
//!
//! Loaded from TOML, optionally overridden by `MEROBRIDGE_*` environment
//! variables, then normalized so every interval is inside its allowed range.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default values
pub mod defaults {
    /// Electricity polling interval in seconds
    pub const ELECTRICITY_POLLING_INTERVAL: u64 = 30;
    /// Lowest electricity interval in seconds
    pub const ELECTRICITY_MIN_INTERVAL: u64 = 30;
    /// Lowest electricity interval when fast local polling is enabled
    pub const ELECTRICITY_FAST_LOCAL_MIN_INTERVAL: u64 = 5;
    /// Consumption polling interval in minutes
    pub const CONSUMPTION_POLLING_INTERVAL: u64 = 30;
    pub const CONSUMPTION_MIN_INTERVAL: u64 = 10;
    /// Largest interval a 32-bit millisecond timer can hold, in minutes
    pub const CONSUMPTION_MAX_INTERVAL: u64 = 35791;
    pub const EXPEDITED_POLL_DELAY: u64 = 2;
    pub const POLL_JITTER_MS: u64 = 1000;
    pub const RECONNECT_DELAY: u64 = 10;
    pub const INIT_RETRY_DELAY: u64 = 60;
    pub const LOG_LEVEL: &str = "info";
}

/// Environment variable names
pub mod env_vars {
    pub const ELECTRICITY_POLLING_INTERVAL: &str = "MEROBRIDGE_ELECTRICITY_POLLING_INTERVAL";
    pub const CONSUMPTION_POLLING_INTERVAL: &str = "MEROBRIDGE_CONSUMPTION_POLLING_INTERVAL";
    pub const LOCAL_FIRST: &str = "MEROBRIDGE_LOCAL_FIRST";
    pub const LOCAL_ONLY: &str = "MEROBRIDGE_LOCAL_ONLY";
    pub const FAST_LOCAL_POLLING: &str = "MEROBRIDGE_FAST_LOCAL_POLLING";
    /// Comma-separated device ids
    pub const DISABLED_DEVICES: &str = "MEROBRIDGE_DISABLED_DEVICES";
    pub const LOG_LEVEL: &str = "MEROBRIDGE_LOG_LEVEL";
    pub const LOG_JSON: &str = "MEROBRIDGE_LOG_JSON";
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set
    pub level: String,
    /// Emit JSON lines instead of compact text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json: false,
        }
    }
}

/// Configuration for the device engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Electricity polling interval in seconds
    pub electricity_polling_interval: u64,
    /// Consumption history polling interval in minutes
    pub consumption_polling_interval: u64,
    /// Delay of an expedited one-off poll in seconds
    pub expedited_poll_delay: u64,
    /// Upper bound of the random delay added to regular poll ticks
    pub poll_jitter_ms: u64,
    /// Backoff after a transport close or error, in seconds
    pub reconnect_delay: u64,
    /// Backoff after a failed ability or snapshot fetch, in seconds
    pub init_retry_delay: u64,
    /// Try a learned local address before the remote route
    pub local_first: bool,
    /// Never fall back to the remote route
    pub local_only: bool,
    /// Allow electricity polling below 30 seconds on local-only setups
    pub fast_local_polling: bool,
    /// Devices whose failures are logged at debug level
    pub disabled_devices: BTreeSet<String>,
    pub logging: LoggingConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            electricity_polling_interval: defaults::ELECTRICITY_POLLING_INTERVAL,
            consumption_polling_interval: defaults::CONSUMPTION_POLLING_INTERVAL,
            expedited_poll_delay: defaults::EXPEDITED_POLL_DELAY,
            poll_jitter_ms: defaults::POLL_JITTER_MS,
            reconnect_delay: defaults::RECONNECT_DELAY,
            init_retry_delay: defaults::INIT_RETRY_DELAY,
            local_first: false,
            local_only: false,
            fast_local_polling: false,
            disabled_devices: BTreeSet::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Parse a TOML document and normalize it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config.normalized())
    }

    /// Load a TOML file, apply environment overrides and normalize.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&content)?;
        Ok(config.apply_env_overrides().normalized())
    }

    /// Apply `MEROBRIDGE_*` environment variables.
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_override::<u64>(&lookup, env_vars::ELECTRICITY_POLLING_INTERVAL) {
            self.electricity_polling_interval = v;
        }
        if let Some(v) = parse_override::<u64>(&lookup, env_vars::CONSUMPTION_POLLING_INTERVAL) {
            self.consumption_polling_interval = v;
        }
        if let Some(v) = parse_override::<bool>(&lookup, env_vars::LOCAL_FIRST) {
            self.local_first = v;
        }
        if let Some(v) = parse_override::<bool>(&lookup, env_vars::LOCAL_ONLY) {
            self.local_only = v;
        }
        if let Some(v) = parse_override::<bool>(&lookup, env_vars::FAST_LOCAL_POLLING) {
            self.fast_local_polling = v;
        }
        if let Some(list) = lookup(env_vars::DISABLED_DEVICES) {
            self.disabled_devices = list
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(level) = lookup(env_vars::LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(v) = parse_override::<bool>(&lookup, env_vars::LOG_JSON) {
            self.logging.json = v;
        }
        self
    }

    /// Clamp every interval into its allowed range.
    pub fn normalized(mut self) -> Self {
        let electricity_floor = if self.local_only && self.fast_local_polling {
            defaults::ELECTRICITY_FAST_LOCAL_MIN_INTERVAL
        } else {
            defaults::ELECTRICITY_MIN_INTERVAL
        };
        if self.electricity_polling_interval < electricity_floor {
            tracing::warn!(
                configured = self.electricity_polling_interval,
                floor = electricity_floor,
                "Electricity polling interval too low, clamping"
            );
            self.electricity_polling_interval = electricity_floor;
        }

        let clamped = self.consumption_polling_interval.clamp(
            defaults::CONSUMPTION_MIN_INTERVAL,
            defaults::CONSUMPTION_MAX_INTERVAL,
        );
        if clamped != self.consumption_polling_interval {
            tracing::warn!(
                configured = self.consumption_polling_interval,
                used = clamped,
                "Consumption polling interval out of range, clamping"
            );
            self.consumption_polling_interval = clamped;
        }

        self.expedited_poll_delay = self.expedited_poll_delay.max(1);
        self
    }

    pub fn electricity_interval(&self) -> Duration {
        Duration::from_secs(self.electricity_polling_interval)
    }

    pub fn consumption_interval(&self) -> Duration {
        Duration::from_secs(self.consumption_polling_interval * 60)
    }

    pub fn expedited_delay(&self) -> Duration {
        Duration::from_secs(self.expedited_poll_delay)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay)
    }

    pub fn init_retry_delay(&self) -> Duration {
        Duration::from_secs(self.init_retry_delay)
    }

    /// Whether failures of `device_id` should be logged quietly.
    pub fn is_disabled(&self, device_id: &str) -> bool {
        self.disabled_devices.contains(device_id)
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.electricity_interval(), Duration::from_secs(30));
        assert_eq!(config.consumption_interval(), Duration::from_secs(30 * 60));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(10));
        assert_eq!(config.init_retry_delay(), Duration::from_secs(60));
        assert_eq!(config.expedited_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_electricity_floor() {
        let config = BridgeConfig {
            electricity_polling_interval: 5,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.electricity_polling_interval, 30);

        let config = BridgeConfig {
            electricity_polling_interval: 5,
            local_only: true,
            fast_local_polling: true,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.electricity_polling_interval, 5);

        let config = BridgeConfig {
            electricity_polling_interval: 1,
            local_only: true,
            fast_local_polling: true,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.electricity_polling_interval, 5);
    }

    #[test]
    fn test_consumption_clamp() {
        let low = BridgeConfig {
            consumption_polling_interval: 1,
            ..Default::default()
        }
        .normalized();
        assert_eq!(low.consumption_polling_interval, 10);

        let high = BridgeConfig {
            consumption_polling_interval: 100_000,
            ..Default::default()
        }
        .normalized();
        assert_eq!(high.consumption_polling_interval, 35791);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = BridgeConfig::default().apply_overrides_from(|key| match key {
            env_vars::LOCAL_ONLY => Some("true".to_string()),
            env_vars::DISABLED_DEVICES => Some("a, b,,c".to_string()),
            env_vars::ELECTRICITY_POLLING_INTERVAL => Some("not-a-number".to_string()),
            _ => None,
        });
        assert!(config.local_only);
        assert!(config.is_disabled("b"));
        assert_eq!(config.disabled_devices.len(), 3);
        assert_eq!(config.electricity_polling_interval, 30);
    }
}
