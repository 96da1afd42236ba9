//! Refetch policy engine
//!
//! Decides, per retrieval call, whether a cached slice can be served as is,
//! needs missing days filled, needs its immature tail refreshed, or must be
//! replaced outright.
//!
//! # Decision rules
//!
//! Non-latency parameters always get [`RefetchDecision::GapsOnly`].
//!
//! Cohort queries (first match wins):
//! 1. no slice → replace (`no_existing_slice`)
//! 2. slice with no dates → replace (`no_cohort_dates`)
//! 3. any immature cohort day → replace (`immature_cohorts`)
//! 4. retrieved longer ago than the maturity window → replace (`stale_data`)
//! 5. otherwise → use cache
//!
//! Window queries: gaps only when the whole window is mature, otherwise
//! partial refresh from `max(start, cutoff)` to the end.

use crate::maturity::{Maturity, MaturityPolicy};
use crate::model::{LatencyConfig, ParameterValue};
use chrono::NaiveDate;
use funnel_slice::DateRange;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Why a cached cohort slice must be replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceReason {
    /// Nothing cached for this slice
    NoExistingSlice,
    /// Cached slice holds no cohort days
    NoCohortDates,
    /// At least one cached cohort is still maturing
    ImmatureCohorts,
    /// Cached data was retrieved too long ago
    StaleData,
}

impl Display for ReplaceReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoExistingSlice => "no_existing_slice",
            Self::NoCohortDates => "no_cohort_dates",
            Self::ImmatureCohorts => "immature_cohorts",
            Self::StaleData => "stale_data",
        };
        f.write_str(text)
    }
}

/// Outcome of [`should_refetch`]; created and consumed within one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RefetchDecision {
    /// Serve from cache, no remote call
    UseCache,
    /// Fetch only missing mature days
    GapsOnly,
    /// Re-fetch the immature tail (plus any earlier missing days)
    Partial {
        /// First immature day
        mature_cutoff: NaiveDate,
        /// Immature tail of the requested window
        refetch_window: DateRange,
    },
    /// Discard and re-fetch the whole requested window
    ReplaceSlice {
        /// Why
        reason: ReplaceReason,
    },
}

impl RefetchDecision {
    /// Short label for logs
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::UseCache => "use_cache",
            Self::GapsOnly => "gaps_only",
            Self::Partial { .. } => "partial",
            Self::ReplaceSlice { .. } => "replace_slice",
        }
    }
}

/// Inputs to [`should_refetch`]
#[derive(Debug, Clone, Copy)]
pub struct RefetchRequest<'a> {
    /// Cached slice for this query, if any
    pub existing_slice: Option<&'a ParameterValue>,
    /// Parameter latency configuration
    pub latency: &'a LatencyConfig,
    /// Window or cohort range being asked for
    pub requested_window: DateRange,
    /// Cohort-mode query
    pub is_cohort_query: bool,
    /// "Today"
    pub reference_date: NaiveDate,
}

/// Decide how to satisfy a request from cache
#[must_use]
pub fn should_refetch(request: &RefetchRequest<'_>, policy: &MaturityPolicy) -> RefetchDecision {
    if !request.latency.latency_parameter {
        return RefetchDecision::GapsOnly;
    }

    let maturity = policy.at(request.latency, request.reference_date);
    if request.is_cohort_query {
        cohort_decision(request.existing_slice, &maturity)
    } else {
        window_decision(request.requested_window, &maturity)
    }
}

/// Maturity view a decision was made under
///
/// Non-latency parameters treat every day as mature.
#[must_use]
pub fn maturity_for(
    latency: &LatencyConfig,
    reference: NaiveDate,
    policy: &MaturityPolicy,
) -> Maturity {
    if latency.latency_parameter {
        policy.at(latency, reference)
    } else {
        Maturity::unbounded(reference)
    }
}

fn cohort_decision(existing: Option<&ParameterValue>, maturity: &Maturity) -> RefetchDecision {
    let replace = |reason| RefetchDecision::ReplaceSlice { reason };

    let Some(slice) = existing else {
        return replace(ReplaceReason::NoExistingSlice);
    };
    if slice.dates.is_empty() {
        return replace(ReplaceReason::NoCohortDates);
    }
    if slice.dates.iter().any(|d| !maturity.cohort_is_mature(*d)) {
        return replace(ReplaceReason::ImmatureCohorts);
    }

    let stale = slice.retrieved_at().map_or(true, |at| {
        (maturity.reference() - at.date_naive()).num_days() > i64::from(maturity.days())
    });
    if stale {
        return replace(ReplaceReason::StaleData);
    }
    RefetchDecision::UseCache
}

fn window_decision(requested: DateRange, maturity: &Maturity) -> RefetchDecision {
    if maturity.is_mature(requested.end()) {
        return RefetchDecision::GapsOnly;
    }
    match requested.clip_start(maturity.cutoff()) {
        Some(refetch_window) => RefetchDecision::Partial {
            mature_cutoff: maturity.cutoff(),
            refetch_window,
        },
        None => RefetchDecision::GapsOnly,
    }
}
