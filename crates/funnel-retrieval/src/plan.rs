//! Retrieval planning
//!
//! The side-effect-free half of a retrieval: parse, sign, decide, analyze
//! coverage and group gaps against a parameter file as it stands.

use crate::error::RetrievalError;
use chrono::NaiveDate;
use funnel_cache::{
    analyze_coverage, compute_fetch_window, find_slice, matching_slices, maturity_for,
    plan_gaps, should_refetch, Maturity, MaturityPolicy, ParameterFile, ParameterValue,
    RefetchDecision, RefetchRequest, SliceCoverage,
};
use funnel_slice::{
    canonicalize, context_key, CanonicalSlice, DateRange, QueryShape, QuerySignature,
    SliceIdentity, SliceMode,
};
use serde::Serialize;

/// Everything decided before the first remote call
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalPlan {
    /// Canonical split of the requested DSL
    pub canonical: CanonicalSlice,
    /// Requested window or cohort range
    pub window: DateRange,
    /// Window or cohort
    pub mode: SliceMode,
    /// Signature of the query shape, if one was given
    pub query_signature: Option<QuerySignature>,
    /// Refetch decision
    pub decision: RefetchDecision,
    /// Coverage of the window by matching slices
    pub coverage: SliceCoverage,
    /// Single spanning fetch window, if any
    pub fetch_window: Option<DateRange>,
    /// Contiguous gaps to fetch, ascending
    pub gaps: Vec<DateRange>,
    /// Maturity thresholds the decision used
    #[serde(skip)]
    pub maturity: Maturity,
}

impl RetrievalPlan {
    /// Whether the cache answers the request without remote calls
    #[inline]
    #[must_use]
    pub fn is_cache_hit(&self) -> bool {
        self.gaps.is_empty()
    }

    /// Whether the stored slice is discarded before merging
    #[inline]
    #[must_use]
    pub fn replaces_slice(&self) -> bool {
        matches!(self.decision, RefetchDecision::ReplaceSlice { .. })
    }

    /// Stored slices answering this request, signature-filtered
    #[must_use]
    pub fn answering<'a>(&self, file: &'a ParameterFile) -> Vec<&'a ParameterValue> {
        answering_slices(file, &self.canonical, self.query_signature.as_ref())
    }
}

/// Signature of `shape` bound to the context of the request
///
/// # Errors
/// [`RetrievalError::Signature`] if the shape cannot be serialized
pub fn sign_query(
    shape: Option<&QueryShape>,
    canonical: &CanonicalSlice,
) -> Result<Option<QuerySignature>, RetrievalError> {
    shape
        .map(|shape| {
            let bound = shape.clone().with_context(context_key(&canonical.fetch));
            QuerySignature::compute(&bound)
        })
        .transpose()
        .map_err(RetrievalError::from)
}

/// Plan a retrieval of `dsl` against `file`
///
/// # Errors
/// Malformed DSL, a DSL without a window or cohort clause, or an
/// unserializable query shape
pub fn plan_retrieval(
    file: &ParameterFile,
    dsl: &str,
    shape: Option<&QueryShape>,
    reference: NaiveDate,
    policy: &MaturityPolicy,
) -> Result<RetrievalPlan, RetrievalError> {
    let canonical = canonicalize(dsl, reference)?;
    let (Some(window), Some(mode)) = (canonical.fetch.range(), canonical.fetch.mode()) else {
        return Err(RetrievalError::MissingRange(dsl.to_string()));
    };
    let query_signature = sign_query(shape, &canonical)?;
    let is_cohort_query = mode == SliceMode::Cohort;

    let existing_slice = if is_cohort_query {
        find_slice(&file.values, &canonical.slice_key, query_signature.as_ref())
    } else {
        None
    };
    let decision = should_refetch(
        &RefetchRequest {
            existing_slice,
            latency: &file.latency,
            requested_window: window,
            is_cohort_query,
            reference_date: reference,
        },
        policy,
    );

    let maturity = maturity_for(&file.latency, reference, policy);
    let matching = answering_slices(file, &canonical, query_signature.as_ref());
    let coverage = analyze_coverage(&matching, window, maturity.cutoff());
    let fetch_window = compute_fetch_window(&decision, &coverage, window);
    let gaps = plan_gaps(&decision, &coverage, window);

    tracing::debug!(
        slice = %canonical.slice_key,
        decision = decision.label(),
        gaps = gaps.len(),
        "Planned retrieval"
    );

    Ok(RetrievalPlan {
        canonical,
        window,
        mode,
        query_signature,
        decision,
        coverage,
        fetch_window,
        gaps,
        maturity,
    })
}

fn answering_slices<'a>(
    file: &'a ParameterFile,
    canonical: &CanonicalSlice,
    signature: Option<&QuerySignature>,
) -> Vec<&'a ParameterValue> {
    matching_slices(&file.values, &SliceIdentity::of(&canonical.fetch))
        .into_iter()
        .filter(|v| v.matches_signature(signature))
        .collect()
}
