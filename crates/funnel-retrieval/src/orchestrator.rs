//! Incremental fetch orchestrator
//!
//! Drives one remote call per gap, strictly in ascending date order, and
//! persists after every successful gap before touching the next one. A
//! crash or rate limit on gap *k+1* therefore never loses gaps `1..=k`.
//!
//! # Per-gap outcomes
//! - rows returned: merge, persist, count the days; days of the gap the
//!   response left out are stored as zero-count rows when markers are on
//! - zero rows: raise `no_data_returned`; optionally persist a `no_data`
//!   marker so the days are not asked for again
//! - rate limit: with atomicity enforced, fail with
//!   [`RetrievalError::RateLimited`]; otherwise skip the gap and go on
//! - any other failure: fail with [`RetrievalError::Adapter`]
//!
//! No compensating rollback happens on failure: persisted gaps stay valid.

use crate::adapter::{
    combine_dual, ExecuteOptions, QueryPattern, QueryPayload, QueryRole, RemoteAdapter,
    RetrievalTarget,
};
use crate::clock::{Clock, SystemClock};
use crate::config::RetrievalConfig;
use crate::error::{AdapterError, RetrievalError};
use crate::plan::{plan_retrieval, RetrievalPlan};
use crate::registry::FileRegistry;
use chrono::NaiveDate;
use funnel_cache::{
    aggregate_latency, compute_evidence, compute_forecast, no_data_rows, resolve_p_mean,
    DailyRow, Evidence, LatencySummary, MergeSpec, ParameterFile, ParameterValue,
    RefetchDecision,
};
use funnel_slice::{build_slice_key, DateRange, QueryShape, SliceMode};
use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument;
use ulid::Ulid;

/// Per-call options; unset fields fall back to the engine configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrieveOptions {
    /// Override `enforce_atomicity_scope`
    pub enforce_atomicity_scope: Option<bool>,
    /// Override `write_no_data_markers`
    pub write_no_data_markers: Option<bool>,
    /// Query pattern for the remote calls
    pub pattern: QueryPattern,
    /// Shape of the remote query, hashed into the query signature
    pub query_shape: Option<QueryShape>,
    /// "Today"; defaults to the clock
    pub reference_date: Option<NaiveDate>,
    /// Connection for parameters that have none stored
    pub connection: Option<String>,
}

impl RetrieveOptions {
    /// Create default options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With atomicity enforcement
    #[inline]
    #[must_use]
    pub fn enforce_atomicity(mut self, enforce: bool) -> Self {
        self.enforce_atomicity_scope = Some(enforce);
        self
    }

    /// With no-data marker policy
    #[inline]
    #[must_use]
    pub fn write_no_data_markers(mut self, write: bool) -> Self {
        self.write_no_data_markers = Some(write);
        self
    }

    /// With query pattern
    #[inline]
    #[must_use]
    pub fn with_pattern(mut self, pattern: QueryPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// With query shape
    #[inline]
    #[must_use]
    pub fn with_query_shape(mut self, shape: QueryShape) -> Self {
        self.query_shape = Some(shape);
        self
    }

    /// With reference date
    #[inline]
    #[must_use]
    pub fn with_reference_date(mut self, day: NaiveDate) -> Self {
        self.reference_date = Some(day);
        self
    }

    /// With fallback connection
    #[inline]
    #[must_use]
    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }
}

/// Result of one retrieval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalOutcome {
    /// Parameter id
    pub param_id: String,
    /// Canonical slice key of the request
    pub slice_key: String,
    /// Refetch decision taken
    pub decision: RefetchDecision,
    /// Days of rows persisted by this call
    pub days_fetched: usize,
    /// Served entirely from cache, no remote call made
    pub cache_hit: bool,
    /// A remote call answered with zero rows
    pub no_data_returned: bool,
    /// Gaps fetched and persisted
    pub gaps_fetched: Vec<DateRange>,
    /// Gaps skipped on a rate limit (atomicity not enforced)
    pub gaps_skipped: Vec<DateRange>,
    /// Stored slices answering the request after the merge, each carrying
    /// the query-time `evidence` and `forecast` of this request
    pub values: Vec<ParameterValue>,
    /// Σk/Σn over the requested window
    pub evidence: Evidence,
    /// Mean over mature days only, latency parameters only
    pub forecast: Option<f64>,
    /// Externally visible mean
    pub p_mean: f64,
    /// Onset and lag over the answering window slices
    pub latency: LatencySummary,
}

impl RetrievalOutcome {
    /// Whether every planned gap was fetched
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.gaps_skipped.is_empty()
    }
}

/// Incremental retrieval engine over an injected registry and adapter
#[derive(Debug)]
pub struct Retriever<R, A> {
    registry: Arc<R>,
    adapter: Arc<A>,
    config: RetrievalConfig,
    clock: Arc<dyn Clock>,
}

impl<R, A> Clone for Retriever<R, A> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            adapter: Arc::clone(&self.adapter),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R: FileRegistry, A: RemoteAdapter> Retriever<R, A> {
    /// Create engine with default configuration and the system clock
    #[must_use]
    pub fn new(registry: Arc<R>, adapter: Arc<A>) -> Self {
        Self {
            registry,
            adapter,
            config: RetrievalConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// With configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    /// With clock
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// File registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Plan without fetching
    ///
    /// # Errors
    /// Registry failures and malformed requests
    pub async fn plan(
        &self,
        param_id: &str,
        dsl: &str,
        options: &RetrieveOptions,
    ) -> Result<RetrievalPlan, RetrievalError> {
        let file = self
            .registry
            .get_file(param_id)
            .await?
            .unwrap_or_else(|| ParameterFile::new(param_id));
        let reference = options.reference_date.unwrap_or_else(|| self.clock.today());
        plan_retrieval(
            &file,
            dsl,
            options.query_shape.as_ref(),
            reference,
            &self.config.maturity,
        )
    }

    /// Bring the cached slice for `dsl` up to date and return it
    ///
    /// # Errors
    /// - [`RetrievalError::RateLimited`] under enforced atomicity; every gap
    ///   before the refused one is already persisted
    /// - [`RetrievalError::Adapter`] on any other remote failure
    /// - malformed DSL, missing connection, or registry failures
    pub async fn retrieve(
        &self,
        param_id: &str,
        target: &RetrievalTarget,
        dsl: &str,
        options: &RetrieveOptions,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        let run_id = Ulid::new();
        let span = tracing::info_span!(
            "retrieve",
            param_id,
            target = %target,
            run_id = %run_id,
        );
        self.run(param_id, target, dsl, options, run_id)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        param_id: &str,
        target: &RetrievalTarget,
        dsl: &str,
        options: &RetrieveOptions,
        run_id: Ulid,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        let reference = options.reference_date.unwrap_or_else(|| self.clock.today());
        let stored = self.registry.get_file(param_id).await?;
        let mut registered = stored.is_some();
        let mut file = stored.unwrap_or_else(|| {
            let file = ParameterFile::new(param_id);
            match &options.connection {
                Some(connection) => file.with_connection(connection.clone()),
                None => file,
            }
        });

        let plan = plan_retrieval(
            &file,
            dsl,
            options.query_shape.as_ref(),
            reference,
            &self.config.maturity,
        )?;

        if plan.is_cache_hit() {
            tracing::info!(slice = %plan.canonical.slice_key, decision = plan.decision.label(), "Served from cache");
            return Ok(self.outcome(param_id, &file, &plan, Progress::cache_hit()));
        }

        let connection = file
            .connection
            .clone()
            .or_else(|| options.connection.clone())
            .ok_or_else(|| RetrievalError::NoConnection(param_id.to_string()))?;
        let enforce = options
            .enforce_atomicity_scope
            .unwrap_or(self.config.enforce_atomicity_scope);
        let write_markers = options
            .write_no_data_markers
            .unwrap_or(self.config.write_no_data_markers);

        tracing::info!(
            slice = %plan.canonical.slice_key,
            decision = plan.decision.label(),
            gaps = plan.gaps.len(),
            "Fetching gaps"
        );

        let mut progress = Progress::default();
        for gap in &plan.gaps {
            let gap = *gap;
            let fetched = self
                .fetch_gap(&connection, param_id, target, &plan, gap, options.pattern, run_id)
                .await;

            let rows = match fetched {
                Ok(rows) => rows,
                Err(err) if err.is_rate_limit() => {
                    if enforce {
                        tracing::warn!(%gap, days_fetched = progress.days_fetched, "Rate limited; aborting retrieval");
                        return Err(RetrievalError::RateLimited {
                            gap,
                            days_fetched: progress.days_fetched,
                            message: err.message().to_string(),
                        });
                    }
                    tracing::warn!(%gap, error = %err, "Rate limited; skipping gap");
                    progress.gaps_skipped.push(gap);
                    continue;
                }
                Err(source) => {
                    tracing::error!(%gap, error = %source, "Remote query failed");
                    return Err(RetrievalError::Adapter { gap, source });
                }
            };

            let mut spec = MergeSpec::new(plan.canonical.fetch.with_range(gap), self.clock.now())
                .with_signature(plan.query_signature.clone())
                .with_source_type(self.adapter.source_type())
                .replacing(plan.replaces_slice());

            let rows = if rows.is_empty() {
                progress.no_data_returned = true;
                tracing::info!(%gap, "No data returned");
                if write_markers {
                    spec = spec.as_no_data();
                    no_data_rows(gap)
                } else if plan.replaces_slice() {
                    rows
                } else {
                    continue;
                }
            } else {
                progress.days_fetched += rows.len();
                if write_markers {
                    fill_missing_days(rows, gap)
                } else {
                    rows
                }
            };

            // Fresh read-then-write: another writer may have merged meanwhile
            if let Some(current) = self.registry.get_file(param_id).await? {
                file = current;
                registered = true;
            }
            file = file.merged(&rows, &spec);
            if let Err(err) = file.check_invariants() {
                tracing::warn!(error = %err, "Parameter file violates an invariant after merge");
            }
            self.persist(param_id, &file, registered).await?;
            registered = true;
            progress.gaps_fetched.push(gap);
            tracing::debug!(%gap, rows = rows.len(), "Persisted gap");
        }

        tracing::info!(
            days_fetched = progress.days_fetched,
            skipped = progress.gaps_skipped.len(),
            "Retrieval finished"
        );
        Ok(self.outcome(param_id, &file, &plan, progress))
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_gap(
        &self,
        connection: &str,
        param_id: &str,
        target: &RetrievalTarget,
        plan: &RetrievalPlan,
        gap: DateRange,
        pattern: QueryPattern,
        run_id: Ulid,
    ) -> Result<Vec<DailyRow>, AdapterError> {
        let fetch = plan.canonical.fetch.with_range(gap);
        let payload = |role| QueryPayload {
            param_id: param_id.to_string(),
            target: target.clone(),
            slice_key: build_slice_key(&fetch),
            fetch: fetch.clone(),
            query_signature: plan.query_signature.clone(),
            role,
        };
        let options = ExecuteOptions {
            window: gap,
            mode: plan.mode,
            run_id,
        };

        let mut rows = match pattern {
            QueryPattern::Simple => {
                self.adapter
                    .execute(connection, &payload(QueryRole::Single), &options)
                    .await?
                    .time_series
            }
            QueryPattern::Composite => {
                self.adapter
                    .execute_composite(connection, &payload(QueryRole::Single), &options)
                    .await?
                    .evidence
                    .time_series
            }
            QueryPattern::Dual => {
                let base = self
                    .adapter
                    .execute(connection, &payload(QueryRole::Base), &options)
                    .await?;
                let conditioned = self
                    .adapter
                    .execute(connection, &payload(QueryRole::Conditioned), &options)
                    .await?;
                combine_dual(&base.time_series, &conditioned.time_series)
            }
        };

        rows.retain(|row| gap.contains(row.date));
        rows.sort_by_key(|row| row.date);
        rows.dedup_by_key(|row| row.date);
        Ok(rows)
    }

    async fn persist(
        &self,
        param_id: &str,
        file: &ParameterFile,
        registered: bool,
    ) -> Result<(), RetrievalError> {
        if registered {
            self.registry.update_file(param_id, file).await?;
        } else {
            self.registry.register_file(param_id, file).await?;
        }
        Ok(())
    }

    fn outcome(
        &self,
        param_id: &str,
        file: &ParameterFile,
        plan: &RetrievalPlan,
        progress: Progress,
    ) -> RetrievalOutcome {
        let answering = plan.answering(file);
        let evidence = compute_evidence(&answering, plan.window);
        let forecast = file
            .latency
            .latency_parameter
            .then(|| compute_forecast(&answering, plan.window, plan.mode, &plan.maturity))
            .flatten();
        let fully_mature = match plan.mode {
            SliceMode::Window => plan.maturity.is_mature(plan.window.end()),
            SliceMode::Cohort => plan.maturity.cohort_is_mature(plan.window.end()),
        };
        let p_mean = resolve_p_mean(&file.latency, &evidence, forecast, fully_mature);
        let values: Vec<ParameterValue> = answering
            .into_iter()
            .map(|value| {
                let mut value = value.clone();
                value.evidence = Some(evidence);
                value.forecast = forecast;
                value
            })
            .collect();

        RetrievalOutcome {
            param_id: param_id.to_string(),
            slice_key: plan.canonical.slice_key.clone(),
            decision: plan.decision,
            days_fetched: progress.days_fetched,
            cache_hit: progress.cache_hit,
            no_data_returned: progress.no_data_returned,
            gaps_fetched: progress.gaps_fetched,
            gaps_skipped: progress.gaps_skipped,
            latency: aggregate_latency(&values),
            values,
            evidence,
            forecast,
            p_mean,
        }
    }
}

/// Zero-count rows for the days of `gap` a sparse response left out
///
/// `rows` must be sorted by date and unique.
fn fill_missing_days(rows: Vec<DailyRow>, gap: DateRange) -> Vec<DailyRow> {
    let missing = gap.len_days().saturating_sub(rows.len());
    if missing == 0 {
        return rows;
    }
    tracing::debug!(%gap, missing, "Marking days absent from response");
    let mut returned = rows.into_iter().peekable();
    let mut filled = Vec::new();
    for day in gap.days() {
        match returned.next_if(|row| row.date == day) {
            Some(row) => filled.push(row),
            None => filled.push(DailyRow::empty(day)),
        }
    }
    filled
}

#[derive(Debug, Default)]
struct Progress {
    days_fetched: usize,
    cache_hit: bool,
    no_data_returned: bool,
    gaps_fetched: Vec<DateRange>,
    gaps_skipped: Vec<DateRange>,
}

impl Progress {
    fn cache_hit() -> Self {
        Self {
            cache_hit: true,
            ..Self::default()
        }
    }
}
