//! Testing utilities for the funnel workspace
//!
//! Shared fixtures and a scripted remote adapter.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use funnel_cache::{DailyRow, DataSource, ParameterFile, ParameterValue};
use funnel_retrieval::{
    AdapterError, AdapterResponse, CompositeEvidence, CompositeResponse, ExecuteOptions,
    FileRegistry, FixedClock, InMemoryFileRegistry, QueryPayload, QueryRole, RemoteAdapter,
    RetrievalConfig, Retriever,
};
use funnel_slice::DateRange;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const TEST_CONNECTION: &str = "amplitude-test";

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Day of December 2025
pub fn dec25(d: u32) -> NaiveDate {
    day(2025, 12, d)
}

/// "Today" in every scenario
pub fn reference_date() -> NaiveDate {
    dec25(9)
}

pub fn range(start: NaiveDate, end: NaiveDate) -> DateRange {
    DateRange::new(start, end).unwrap()
}

pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::at_date(reference_date()))
}

pub fn param_file(id: &str) -> ParameterFile {
    ParameterFile::new(id).with_connection(TEST_CONNECTION)
}

/// Window slice over `start..=end` holding rows for `days` only
pub fn cached_window(start: NaiveDate, end: NaiveDate, days: &[NaiveDate]) -> ParameterValue {
    let rows: Vec<DailyRow> = days.iter().map(|d| DailyRow::new(*d, 100, 10)).collect();
    let mut value = ParameterValue::from_rows(format!("window({})", range(start, end)), &rows);
    value.window_from = Some(start);
    value.window_to = Some(end);
    value.data_source = Some(DataSource {
        source_type: "scripted".to_string(),
        retrieved_at: Utc.from_utc_datetime(&reference_date().and_hms_opt(0, 0, 0).unwrap()),
        no_data: false,
    });
    value
}

pub async fn open_registry(files: impl IntoIterator<Item = ParameterFile>) -> Arc<InMemoryFileRegistry> {
    let registry = Arc::new(InMemoryFileRegistry::new().with_files(files));
    registry.open().await.unwrap();
    registry
}

/// Retriever on the fixed test clock
pub fn retriever<R: FileRegistry>(
    registry: Arc<R>,
    adapter: Arc<ScriptedAdapter>,
    config: RetrievalConfig,
) -> Retriever<R, ScriptedAdapter> {
    Retriever::new(registry, adapter)
        .with_config(config)
        .with_clock(fixed_clock())
}

/// How the scripted adapter answers one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// One row per day of the requested window
    Counts { n: u64, k: u64 },
    /// Exactly these rows
    Rows(Vec<DailyRow>),
    /// Zero rows
    Empty,
    /// HTTP 429
    RateLimit,
    /// Non-retryable failure
    Fatal(String),
}

impl Reply {
    fn answer(&self, window: DateRange) -> Result<Vec<DailyRow>, AdapterError> {
        match self {
            Self::Counts { n, k } => Ok(window.days().map(|d| DailyRow::new(d, *n, *k)).collect()),
            Self::Rows(rows) => Ok(rows.clone()),
            Self::Empty => Ok(Vec::new()),
            Self::RateLimit => Err(AdapterError::new("HTTP 429: Too Many Requests")),
            Self::Fatal(message) => Err(AdapterError::new(message.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub connection: String,
    pub slice_key: String,
    pub window: DateRange,
    pub role: QueryRole,
    pub composite: bool,
}

/// Adapter answering from a queue of replies, then a fallback
#[derive(Debug)]
pub struct ScriptedAdapter {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for ScriptedAdapter {
    fn default() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Reply::Counts { n: 100, k: 10 },
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next reply
    pub fn then(mut self, reply: Reply) -> Self {
        self.replies.get_mut().push_back(reply);
        self
    }

    /// Reply once the queue is empty
    pub fn otherwise(mut self, reply: Reply) -> Self {
        self.fallback = reply;
        self
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Queue a reply on a shared adapter
    pub async fn push(&self, reply: Reply) {
        self.replies.lock().await.push_back(reply);
    }

    async fn respond(
        &self,
        connection: &str,
        payload: &QueryPayload,
        options: &ExecuteOptions,
        composite: bool,
    ) -> Result<Vec<DailyRow>, AdapterError> {
        self.calls.lock().await.push(RecordedCall {
            connection: connection.to_string(),
            slice_key: payload.slice_key.clone(),
            window: options.window,
            role: payload.role,
            composite,
        });
        let reply = self
            .replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        reply.answer(options.window)
    }
}

#[async_trait]
impl RemoteAdapter for ScriptedAdapter {
    fn source_type(&self) -> &str {
        "scripted"
    }

    async fn execute(
        &self,
        connection: &str,
        payload: &QueryPayload,
        options: &ExecuteOptions,
    ) -> Result<AdapterResponse, AdapterError> {
        let rows = self.respond(connection, payload, options, false).await?;
        Ok(AdapterResponse::from_rows(rows))
    }

    async fn execute_composite(
        &self,
        connection: &str,
        payload: &QueryPayload,
        options: &ExecuteOptions,
    ) -> Result<CompositeResponse, AdapterError> {
        let rows = self.respond(connection, payload, options, true).await?;
        let n: u64 = rows.iter().map(|r| r.n).sum();
        let k: u64 = rows.iter().map(|r| r.k).sum();
        #[allow(clippy::cast_precision_loss)]
        let p_mean = if n == 0 { 0.0 } else { k as f64 / n as f64 };
        Ok(CompositeResponse {
            n,
            k,
            p_mean,
            evidence: CompositeEvidence { time_series: rows },
        })
    }
}
