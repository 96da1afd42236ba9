//! Query signatures
//!
//! A [`QuerySignature`] is a Blake3 digest of the *shape* of a remote query:
//! event definitions, filters and the slice identity. The slice key string
//! can stay the same while the meaning of the query changes (an edited
//! event filter, a renamed step), and the signature is what catches that.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Everything that determines what a remote query means
///
/// Serialized to JSON before hashing. Object keys are sorted by
/// `serde_json`'s default map, so equal shapes hash equally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryShape {
    /// Ordered funnel event ids (from, via..., to)
    pub events: Vec<String>,
    /// Adapter-specific filter definitions
    pub filters: BTreeMap<String, serde_json::Value>,
    /// Canonical context clauses of the slice
    pub context: String,
}

impl QueryShape {
    /// Create shape for an event sequence
    #[inline]
    #[must_use]
    pub fn new(events: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            events: events.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Add a filter definition
    #[inline]
    #[must_use]
    pub fn with_filter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.filters.insert(name.into(), value);
        self
    }

    /// Set canonical context clauses
    #[inline]
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// Hex-encoded Blake3 digest of a [`QueryShape`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuerySignature(String);

impl QuerySignature {
    /// Compute signature of a query shape
    ///
    /// # Errors
    /// Returns error if a filter value cannot be serialized
    pub fn compute(shape: &QueryShape) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_vec(shape)?;
        Ok(Self(blake3::hash(&json).to_hex().to_string()))
    }

    /// Wrap an already-computed signature
    #[inline]
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 16 hex chars) for logs
    #[inline]
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..16).unwrap_or(&self.0)
    }

    /// Check the signature is a 32-byte hex digest
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        hex::decode(&self.0).is_ok_and(|bytes| bytes.len() == 32)
    }
}

impl Display for QuerySignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
