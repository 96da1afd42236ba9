//! Error types for incremental retrieval
//!
//! Four failure classes reach the caller:
//! - malformed input (bad DSL, no date range): fails before any I/O
//! - rate limits: retryable after a cooldown
//! - other adapter failures: fatal for the call, no automatic retry
//! - storage failures from the file registry
//!
//! A zero-row remote answer is not an error.

use crate::classify::classify_adapter_message;
use funnel_slice::{DateRange, DslError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main retrieval error type
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// DSL string did not parse
    #[error("invalid slice DSL: {0}")]
    Dsl(#[from] DslError),

    /// DSL string has neither a window nor a cohort clause
    #[error("'{0}' needs a window(...) or cohort(...) clause")]
    MissingRange(String),

    /// No connection configured for the parameter
    #[error("no connection configured for parameter '{0}'")]
    NoConnection(String),

    /// File registry failed
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Remote side refused with a rate limit; earlier gaps are persisted
    #[error("rate limit (429) while fetching {gap} after {days_fetched} day(s) fetched: {message}")]
    RateLimited {
        /// Gap that was refused
        gap: DateRange,
        /// Days persisted before the refusal
        days_fetched: usize,
        /// Adapter message
        message: String,
    },

    /// Remote side failed for another reason
    #[error("remote query failed for {gap}: {source}")]
    Adapter {
        /// Gap being fetched
        gap: DateRange,
        /// Adapter failure
        #[source]
        source: AdapterError,
    },

    /// Query shape could not be hashed
    #[error("query signature failed: {0}")]
    Signature(#[from] serde_json::Error),

    /// Batch retrieval kept hitting rate limits
    #[error("gave up after {restarts} restart(s): {last}")]
    RestartsExhausted {
        /// Restarts attempted
        restarts: u32,
        /// Last rate-limit failure
        last: Box<RetrievalError>,
    },
}

impl RetrievalError {
    /// Check if the caller may retry after a cooldown
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Days persisted before the failure, when known
    #[inline]
    #[must_use]
    pub fn days_fetched(&self) -> Option<usize> {
        match self {
            Self::RateLimited { days_fetched, .. } => Some(*days_fetched),
            _ => None,
        }
    }
}

/// File registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Used before `open` or after `close`
    #[error("registry is not open")]
    NotOpen,

    /// `update_file` on an id that was never registered
    #[error("file not found: {0}")]
    NotFound(String),

    /// Id cannot name a stored document
    #[error("invalid file id: {0:?}")]
    InvalidId(String),

    /// Filesystem failure
    #[error("io error at {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Stored document is not a valid parameter file
    #[error("malformed document '{id}': {source}")]
    Malformed {
        /// File id
        id: String,
        /// Decode failure
        #[source]
        source: serde_json::Error,
    },
}

/// Coarse adapter failure class; the only thing the engine branches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    /// HTTP 429 or equivalent
    RateLimit,
    /// Anything else
    Fatal,
}

/// Failure reported by a remote adapter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AdapterError {
    kind: AdapterErrorKind,
    message: String,
}

impl AdapterError {
    /// Create error, classifying the message text
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: classify_adapter_message(&message),
            message,
        }
    }

    /// Create rate-limit error
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::RateLimit,
            message: message.into(),
        }
    }

    /// Create non-retryable error
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::Fatal,
            message: message.into(),
        }
    }

    /// Failure class
    #[inline]
    #[must_use]
    pub fn kind(&self) -> AdapterErrorKind {
        self.kind
    }

    /// Adapter message
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this is a rate limit
    #[inline]
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        self.kind == AdapterErrorKind::RateLimit
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Read {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for the config schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn rate_limit_display_mentions_429() {
        let day = NaiveDate::from_ymd_opt(2025, 12, 4).unwrap();
        let err = RetrievalError::RateLimited {
            gap: DateRange::single(day),
            days_fetched: 2,
            message: "slow down".into(),
        };
        let text = err.to_string();
        assert!(text.contains("429"));
        assert!(text.to_lowercase().contains("rate limit"));
        assert!(err.is_retryable());
        assert_eq!(err.days_fetched(), Some(2));
    }

    #[test]
    fn adapter_errors_classify_on_construction() {
        assert!(AdapterError::new("HTTP 429 Too Many Requests").is_rate_limit());
        assert!(!AdapterError::new("connection reset").is_rate_limit());
        assert_eq!(AdapterError::fatal("429").kind(), AdapterErrorKind::Fatal);
    }

    #[test]
    fn fatal_is_not_retryable() {
        let err = RetrievalError::Adapter {
            gap: DateRange::single(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
            source: AdapterError::fatal("boom"),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("boom"));
    }
}
