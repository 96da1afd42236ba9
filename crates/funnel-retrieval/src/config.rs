//! Retrieval configuration
//!
//! Loaded from TOML; every field has a default, so an empty file is valid.
//!
//! ```toml
//! write_no_data_markers = true
//! enforce_atomicity_scope = false
//!
//! [maturity]
//! default_maturity_days = 30
//! boundary_buffer_days = 1
//!
//! [batch]
//! max_concurrent_params = 4
//! rate_limit_cooldown_secs = 60
//! max_restarts = 3
//! ```

use crate::error::ConfigError;
use funnel_cache::MaturityPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maturity thresholds
    pub maturity: MaturityPolicy,
    /// Write a `no_data` marker for zero-row gaps
    pub write_no_data_markers: bool,
    /// Abort multi-gap retrievals on a rate limit (single calls)
    pub enforce_atomicity_scope: bool,
    /// Batch retrieval tuning
    pub batch: BatchConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            maturity: MaturityPolicy::default(),
            write_no_data_markers: true,
            enforce_atomicity_scope: false,
            batch: BatchConfig::default(),
        }
    }
}

impl RetrievalConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With atomicity enforcement
    #[inline]
    #[must_use]
    pub fn with_atomicity(mut self, enforce: bool) -> Self {
        self.enforce_atomicity_scope = enforce;
        self
    }

    /// With maturity policy
    #[inline]
    #[must_use]
    pub fn with_maturity(mut self, maturity: MaturityPolicy) -> Self {
        self.maturity = maturity;
        self
    }

    /// With batch tuning
    #[inline]
    #[must_use]
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// [`ConfigError::Parse`] on invalid TOML or unknown value types
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// [`ConfigError::Read`] or [`ConfigError::Parse`]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&text)
    }
}

/// Batch retrieval tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Parameters fetched concurrently
    pub max_concurrent_params: usize,
    /// Wait after a rate limit before restarting
    pub rate_limit_cooldown_secs: u64,
    /// Restarts before giving up
    pub max_restarts: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_params: 4,
            rate_limit_cooldown_secs: 60,
            max_restarts: 3,
        }
    }
}

impl BatchConfig {
    /// Cooldown as a duration
    #[inline]
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(RetrievalConfig::from_toml_str("").unwrap(), RetrievalConfig::default());
    }

    #[test]
    fn partial_toml_overrides() {
        let config = RetrievalConfig::from_toml_str(
            r"
            enforce_atomicity_scope = true

            [maturity]
            boundary_buffer_days = 0

            [batch]
            rate_limit_cooldown_secs = 5
            ",
        )
        .unwrap();
        assert!(config.enforce_atomicity_scope);
        assert!(config.write_no_data_markers);
        assert_eq!(config.maturity.boundary_buffer_days, 0);
        assert_eq!(config.maturity.default_maturity_days, 30);
        assert_eq!(config.batch.cooldown(), Duration::from_secs(5));
        assert_eq!(config.batch.max_restarts, 3);
    }

    #[test]
    fn bad_types_rejected() {
        assert!(matches!(
            RetrievalConfig::from_toml_str("write_no_data_markers = \"yes\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_is_read_error() {
        assert!(matches!(
            RetrievalConfig::load("/definitely/not/here.toml").await,
            Err(ConfigError::Read { .. })
        ));
    }
}
