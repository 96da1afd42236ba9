//! Remote adapter: the query port
//!
//! The orchestrator only inspects the daily time series and the error
//! class of an adapter answer. Which query pattern produced them does not
//! change the atomicity contract.

use crate::error::AdapterError;
use async_trait::async_trait;
use chrono::NaiveDate;
use funnel_cache::DailyRow;
use funnel_slice::{DateRange, FetchParts, QuerySignature, SliceMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use ulid::Ulid;

/// Graph element a parameter belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RetrievalTarget {
    /// Conversion edge
    Edge(String),
    /// Graph node
    Node(String),
}

impl Display for RetrievalTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Edge(id) => write!(f, "edge:{id}"),
            Self::Node(id) => write!(f, "node:{id}"),
        }
    }
}

/// How a gap is turned into remote calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPattern {
    /// One [`RemoteAdapter::execute`] call
    #[default]
    Simple,
    /// One [`RemoteAdapter::execute_composite`] call (minus-style queries)
    Composite,
    /// Base query for `n` plus conditioned query for `k`, joined by day
    Dual,
}

/// Role of one call within a query pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryRole {
    /// Simple or composite query
    Single,
    /// Dual pattern: denominator query
    Base,
    /// Dual pattern: numerator query
    Conditioned,
}

/// What to ask the remote side for one gap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPayload {
    /// Parameter id
    pub param_id: String,
    /// Graph element
    pub target: RetrievalTarget,
    /// Fetch constraints with the bounds set to the gap
    pub fetch: FetchParts,
    /// Canonical key of `fetch`
    pub slice_key: String,
    /// Signature of the query shape, if any
    pub query_signature: Option<QuerySignature>,
    /// Role within the query pattern
    pub role: QueryRole,
}

/// Per-call options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Gap being fetched
    pub window: DateRange,
    /// Window or cohort semantics
    pub mode: SliceMode,
    /// Retrieval run this call belongs to
    pub run_id: Ulid,
}

/// Answer to [`RemoteAdapter::execute`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterResponse {
    /// Daily rows; empty means "nothing there"
    pub time_series: Vec<DailyRow>,
    /// Remote total, informational
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u64>,
    /// Remote total, informational
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<u64>,
}

impl AdapterResponse {
    /// Response carrying only rows
    #[inline]
    #[must_use]
    pub fn from_rows(time_series: Vec<DailyRow>) -> Self {
        Self {
            time_series,
            n: None,
            k: None,
        }
    }
}

/// Daily evidence of a composite answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeEvidence {
    /// Daily rows
    pub time_series: Vec<DailyRow>,
}

/// Answer to [`RemoteAdapter::execute_composite`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeResponse {
    /// Remote total
    pub n: u64,
    /// Remote total
    pub k: u64,
    /// Remote mean
    pub p_mean: f64,
    /// Daily breakdown
    pub evidence: CompositeEvidence,
}

/// Remote analytics backend
///
/// Timeouts are the adapter's job; they surface as ordinary errors.
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Provenance label written into `data_source.type`
    fn source_type(&self) -> &str;

    /// Run a plain query
    async fn execute(
        &self,
        connection: &str,
        payload: &QueryPayload,
        options: &ExecuteOptions,
    ) -> Result<AdapterResponse, AdapterError>;

    /// Run a composite query
    async fn execute_composite(
        &self,
        connection: &str,
        payload: &QueryPayload,
        options: &ExecuteOptions,
    ) -> Result<CompositeResponse, AdapterError> {
        let _ = (connection, payload, options);
        Err(AdapterError::fatal(format!(
            "{} adapter does not support composite queries",
            self.source_type()
        )))
    }
}

/// Join a dual query by day: `n` from the base rows, `k` from the conditioned rows
///
/// A day present on one side only gets zero for the other.
#[must_use]
pub fn combine_dual(base: &[DailyRow], conditioned: &[DailyRow]) -> Vec<DailyRow> {
    let mut days: BTreeMap<NaiveDate, DailyRow> = BTreeMap::new();
    for row in base {
        days.entry(row.date).or_insert_with(|| DailyRow::empty(row.date)).n = row.n;
    }
    for row in conditioned {
        days.entry(row.date).or_insert_with(|| DailyRow::empty(row.date)).k = row.k;
    }
    days.into_values().collect()
}
