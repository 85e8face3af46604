//! Result and error types for Esperar.

use thiserror::Error;

/// Result type for Esperar operations
pub type EsperarResult<T> = Result<T, EsperarError>;

/// Result type for Page Query Surface reads and actions
pub type PageResult<T> = Result<T, PageError>;

/// Errors reported by a Page Query Surface implementation.
///
/// Inside a poll loop every variant is treated as a stale evaluation and
/// retried. Outside of one (an [`Action`](crate::Action) trigger) they
/// surface as [`EsperarError::Page`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    /// The element was detached or replaced between lookup and read
    #[error("stale element: {message}")]
    Stale {
        /// Error message
        message: String,
    },

    /// No element matched the selector
    #[error("no element matches {selector}")]
    NotFound {
        /// Selector that matched nothing
        selector: String,
    },

    /// Script evaluation failed in the page context
    #[error("script failed: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// The automation transport failed
    #[error("transport error: {message}")]
    Transport {
        /// Error message
        message: String,
    },

    /// The page session was already released
    #[error("page session is closed")]
    Closed,
}

impl PageError {
    /// Create a stale-element error
    #[must_use]
    pub fn stale(message: impl Into<String>) -> Self {
        Self::Stale {
            message: message.into(),
        }
    }

    /// Create a not-found error
    #[must_use]
    pub fn not_found(selector: impl std::fmt::Display) -> Self {
        Self::NotFound {
            selector: selector.to_string(),
        }
    }

    /// Create a script error
    #[must_use]
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Create a transport error
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Errors that can occur in Esperar
#[derive(Debug, Error)]
pub enum EsperarError {
    /// A condition never became true within its budget
    #[error(
        "timed out after {elapsed_ms}ms and {attempts} attempts waiting for {condition}{}",
        last_observed.as_ref().map(|s| format!(" (last observed: {s})")).unwrap_or_default()
    )]
    Timeout {
        /// Description of the condition
        condition: String,
        /// Poll attempts performed
        attempts: u32,
        /// Time spent waiting in milliseconds
        elapsed_ms: u64,
        /// Last not-yet reason reported by the condition
        last_observed: Option<String>,
    },

    /// A condition observed a logically inconsistent page state
    #[error("invariant violated while waiting for {condition}: {message}")]
    InvariantViolation {
        /// Description of the condition
        condition: String,
        /// What was inconsistent
        message: String,
    },

    /// The wait was cancelled through its token
    #[error("wait for {condition} cancelled after {attempts} attempts")]
    Cancelled {
        /// Description of the condition
        condition: String,
        /// Poll attempts performed before cancellation
        attempts: u32,
    },

    /// Invalid state error (operation called in wrong state)
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// Wait options rejected before polling started
    #[error("Invalid wait options: {message}")]
    InvalidOptions {
        /// Error message
        message: String,
    },

    /// An action against the page failed
    #[error("Page action failed: {0}")]
    Page(#[from] PageError),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EsperarError {
    /// Whether this error is a timeout
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_includes_diagnostics() {
        let err = EsperarError::Timeout {
            condition: "visible(.modal-content)".into(),
            attempts: 21,
            elapsed_ms: 10_000,
            last_observed: Some("element hidden".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("10000ms"));
        assert!(msg.contains("21 attempts"));
        assert!(msg.contains("visible(.modal-content)"));
        assert!(msg.contains("last observed: element hidden"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_timeout_message_without_observation() {
        let err = EsperarError::Timeout {
            condition: "c".into(),
            attempts: 1,
            elapsed_ms: 5,
            last_observed: None,
        };
        assert!(!err.to_string().contains("last observed"));
    }

    #[test]
    fn test_page_error_converts() {
        let err: EsperarError = PageError::not_found(".ellipsis-btn").into();
        assert!(matches!(err, EsperarError::Page(PageError::NotFound { .. })));
        assert!(err.to_string().contains(".ellipsis-btn"));
        assert!(!err.is_timeout());
    }
}
