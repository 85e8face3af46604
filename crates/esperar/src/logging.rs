//! Tracing subscriber setup for test binaries.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the test harness or application. [`init`] offers a ready-made one.
//!
//! ## Environment Variables
//!
//! - `ESPERAR_LOG` or `RUST_LOG`: filter directive (e.g. `esperar=debug,warn`)
//! - `ESPERAR_LOG_FORMAT`: `pretty`, `compact` or `json`
//!
//! ```bash
//! # Trace every poll attempt while debugging a flaky scenario
//! ESPERAR_LOG=esperar=trace cargo test --test data_grid_scenarios
//! ```

use std::str::FromStr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when none is configured or the configured one is invalid
pub const DEFAULT_FILTER: &str = "esperar=info,warn";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human-readable
    #[default]
    Pretty,
    /// Single-line
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    /// Case-insensitive; unknown names fall back to [`LogFormat::Pretty`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive
    pub filter: String,
    /// Output format
    pub format: LogFormat,
    /// Include file and line
    pub with_file: bool,
    /// Include the event target
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
            with_file: false,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Read `ESPERAR_LOG`, `RUST_LOG` and `ESPERAR_LOG_FORMAT`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let filter = lookup("ESPERAR_LOG")
            .or_else(|| lookup("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let format = lookup("ESPERAR_LOG_FORMAT")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        Self {
            filter,
            format,
            ..Self::default()
        }
    }

    /// Verbose configuration showing every poll attempt
    #[must_use]
    pub fn trace() -> Self {
        Self {
            filter: "esperar=trace,info".to_string(),
            format: LogFormat::Compact,
            with_file: true,
            ..Self::default()
        }
    }
}

/// Install the global subscriber.
///
/// Returns `false` when a global subscriber was already installed, which
/// makes repeated calls from several tests harmless.
pub fn init(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    let layer = fmt::layer()
        .with_file(config.with_file)
        .with_line_number(config.with_file)
        .with_target(config.with_target);
    let installed = match config.format {
        LogFormat::Json => registry.with(layer.json()).try_init(),
        LogFormat::Compact => registry.with(layer.compact()).try_init(),
        LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
    };
    installed.is_ok()
}

/// Install the global subscriber configured from the environment
pub fn init_from_env() -> bool {
    init(&LogConfig::from_env())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("fancy".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    }

    #[test]
    fn test_lookup_prefers_esperar_log() {
        let vars: HashMap<&str, &str> = [
            ("ESPERAR_LOG", "esperar=debug"),
            ("RUST_LOG", "warn"),
            ("ESPERAR_LOG_FORMAT", "json"),
        ]
        .into();
        let config = LogConfig::from_lookup(|k| vars.get(k).map(ToString::to_string));
        assert_eq!(config.filter, "esperar=debug");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_lookup_defaults() {
        let config = LogConfig::from_lookup(|_| None);
        assert_eq!(config, LogConfig::default());
    }

    #[test]
    fn test_init_is_idempotent() {
        init(&LogConfig::trace());
        assert!(!init(&LogConfig::default()));
    }
}
