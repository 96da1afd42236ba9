//! Funnel Slice Cache
//!
//! Pure, synchronous core of incremental retrieval: everything that decides
//! *what* to fetch and how fetched rows fold into stored slices. No I/O.
//!
//! # Pipeline
//!
//! ```text
//! should_refetch ─► analyze_coverage ─► plan_gaps ─► (remote call) ─► merge_time_series
//! ```
//!
//! - [`policy`]: use cache, fill gaps, refresh the immature tail, or replace
//! - [`coverage`]: which mature days are missing
//! - [`gaps`]: contiguous runs to fetch, one remote call each
//! - [`merge`]: fold rows in, newest wins per day
//! - [`isolate`]: find the slices that answer a key
//! - [`aggregate`]: evidence, forecast and latency figures
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use funnel_cache::{analyze_coverage, plan_gaps, should_refetch, LatencyConfig, MaturityPolicy, RefetchRequest};
//! use funnel_slice::DateRange;
//!
//! let reference = NaiveDate::from_ymd_opt(2025, 12, 9).unwrap();
//! let window = DateRange::new(
//!     NaiveDate::from_ymd_opt(2025, 11, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
//! )
//! .unwrap();
//! let latency = LatencyConfig::default();
//! let decision = should_refetch(
//!     &RefetchRequest {
//!         existing_slice: None,
//!         latency: &latency,
//!         requested_window: window,
//!         is_cohort_query: false,
//!         reference_date: reference,
//!     },
//!     &MaturityPolicy::default(),
//! );
//! let coverage = analyze_coverage(&[], window, NaiveDate::MAX);
//!
//! assert_eq!(plan_gaps(&decision, &coverage, window), vec![window]);
//! ```

#![warn(unreachable_pub)]

pub mod aggregate;
pub mod coverage;
pub mod error;
pub mod gaps;
pub mod isolate;
pub mod maturity;
pub mod merge;
pub mod model;
pub mod policy;

pub use aggregate::{
    aggregate_latency, compute_evidence, compute_forecast, resolve_p_mean, LatencySummary,
};
pub use coverage::{analyze_coverage, analyze_slice_coverage, MatureCoverage, SliceCoverage};
pub use error::InvariantError;
pub use gaps::{compute_fetch_window, group_contiguous, plan_fetch_dates, plan_gaps};
pub use isolate::{find_slice, isolate_slice, matching_slices};
pub use maturity::{Maturity, MaturityPolicy, DEFAULT_BOUNDARY_BUFFER_DAYS, DEFAULT_MATURITY_DAYS};
pub use merge::{merge_time_series, no_data_rows, MergeSpec};
pub use model::{DailyRow, DataSource, Evidence, LatencyConfig, ParameterFile, ParameterValue};
pub use policy::{maturity_for, should_refetch, RefetchDecision, RefetchRequest, ReplaceReason};
