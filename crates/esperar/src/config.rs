//! Configuration for wait budgets.
//!
//! Loaded from YAML (all fields optional) and optionally overridden from the
//! environment:
//!
//! ```yaml
//! wait:
//!   timeout_ms: 10000
//!   poll_interval_ms: 500
//! alert_window_ms: 250
//! indicator_probe_ms: 2000
//! ```

use crate::result::{EsperarError, EsperarResult};
use crate::wait::{Poller, WaitOptions, DEFAULT_ALERT_WINDOW_MS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding `wait.timeout_ms`
pub const ENV_TIMEOUT_MS: &str = "ESPERAR_TIMEOUT_MS";

/// Environment variable overriding `wait.poll_interval_ms`
pub const ENV_POLL_INTERVAL_MS: &str = "ESPERAR_POLL_INTERVAL_MS";

/// Default loading-indicator probe window (2 seconds)
pub const DEFAULT_INDICATOR_PROBE_MS: u64 = 2_000;

/// Root configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EsperarConfig {
    /// Budget for ordinary waits
    pub wait: WaitOptions,
    /// Window for best-effort alert checks
    pub alert_window_ms: u64,
    /// Window for optional loading-indicator probes
    pub indicator_probe_ms: u64,
}

impl Default for EsperarConfig {
    fn default() -> Self {
        Self {
            wait: WaitOptions::default(),
            alert_window_ms: DEFAULT_ALERT_WINDOW_MS,
            indicator_probe_ms: DEFAULT_INDICATOR_PROBE_MS,
        }
    }
}

impl EsperarConfig {
    /// Parse and validate YAML
    pub fn from_yaml_str(yaml: &str) -> EsperarResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> EsperarResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Apply `ESPERAR_TIMEOUT_MS` / `ESPERAR_POLL_INTERVAL_MS`
    pub fn with_env_overrides(self) -> EsperarResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> EsperarResult<Self> {
        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            self.wait.timeout_ms = parse_ms(ENV_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL_MS) {
            self.wait.poll_interval_ms = parse_ms(ENV_POLL_INTERVAL_MS, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check that every budget is positive
    pub fn validate(&self) -> EsperarResult<()> {
        self.wait.validate()?;
        if self.alert_window_ms == 0 {
            return Err(EsperarError::Config {
                message: "alert_window_ms must be greater than zero".to_string(),
            });
        }
        if self.indicator_probe_ms == 0 {
            return Err(EsperarError::Config {
                message: "indicator_probe_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Poller using the configured wait budget
    #[must_use]
    pub const fn poller(&self) -> Poller {
        Poller::new(self.wait)
    }

    /// Alert window as Duration
    #[must_use]
    pub const fn alert_window(&self) -> Duration {
        Duration::from_millis(self.alert_window_ms)
    }

    /// Indicator probe window as Duration
    #[must_use]
    pub const fn indicator_probe(&self) -> Duration {
        Duration::from_millis(self.indicator_probe_ms)
    }
}

fn parse_ms(key: &str, value: &str) -> EsperarResult<u64> {
    value.trim().parse().map_err(|_| EsperarError::Config {
        message: format!("{key} must be a whole number of milliseconds, got {value:?}"),
    })
}
