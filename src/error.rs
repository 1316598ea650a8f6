//! Crate-level error type.
//!
//! Analysis itself is total and never fails; the variants here cover the
//! surfaces around it: configuration, persisted state and the webhook.

use std::path::PathBuf;

/// Errors returned by configuration, storage, adapters and the cycle runner.
#[derive(Debug, thiserror::Error)]
pub enum RsiError {
    /// A configuration value failed validation. Fatal at startup.
    #[error("invalid config: {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// Filesystem failure while reading or writing persisted state.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted or submitted JSON document could not be (de)serialized.
    #[error("JSON error in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The TOML configuration file could not be parsed.
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The webhook received a request it cannot serve.
    #[error("HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    /// Another cycle currently holds the cycle lock.
    #[error("an analysis cycle is already in progress")]
    CycleInProgress,

    /// A cycle moved onto the blocking pool panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RsiError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RsiError::Io { path: path.into(), source }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        RsiError::Json { context: context.into(), source }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        RsiError::InvalidConfig { field, reason: reason.into() }
    }
}

/// Shorthand result type used across the crate.
pub type Result<T> = std::result::Result<T, RsiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display_names_field() {
        let e = RsiError::invalid("recurrence_threshold", "must be at least 1");
        assert_eq!(e.to_string(), "invalid config: recurrence_threshold: must be at least 1");
    }

    #[test]
    fn test_io_display_includes_path() {
        let e = RsiError::io(
            "/tmp/rsi/outcomes.jsonl",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let s = e.to_string();
        assert!(s.contains("/tmp/rsi/outcomes.jsonl"), "{s}");
        assert!(s.contains("gone"), "{s}");
    }

    #[test]
    fn test_http_display() {
        let e = RsiError::Http { status: 404, detail: "no route".into() };
        assert_eq!(e.to_string(), "HTTP 404: no route");
    }
}
