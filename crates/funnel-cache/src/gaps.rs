//! Gap planning
//!
//! Turns a refetch decision plus coverage into the days to fetch, then
//! groups those days into maximal contiguous runs (one remote call each).

use crate::coverage::SliceCoverage;
use crate::policy::RefetchDecision;
use chrono::{Duration, NaiveDate};
use funnel_slice::DateRange;
use std::collections::BTreeSet;

/// Single spanning window a decision implies, or `None` for no fetch
///
/// - `use_cache` → `None`
/// - `replace_slice` → the whole requested window
/// - `gaps_only` → min..max of the missing mature days, if any
/// - `partial` → the refetch window, extended left over earlier missing days
#[must_use]
pub fn compute_fetch_window(
    decision: &RefetchDecision,
    coverage: &SliceCoverage,
    requested: DateRange,
) -> Option<DateRange> {
    let missing = &coverage.missing_mature_dates;
    match decision {
        RefetchDecision::UseCache => None,
        RefetchDecision::ReplaceSlice { .. } => Some(requested),
        RefetchDecision::GapsOnly => {
            let first = missing.iter().min()?;
            let last = missing.iter().max()?;
            DateRange::new(*first, *last).ok()
        }
        RefetchDecision::Partial { refetch_window, .. } => Some(
            missing
                .iter()
                .min()
                .map_or(*refetch_window, |first| refetch_window.extend_start(*first)),
        ),
    }
}

/// Exact days to fetch, ascending and unique
///
/// Unlike [`compute_fetch_window`], holes between missing days are not
/// filled in.
#[must_use]
pub fn plan_fetch_dates(
    decision: &RefetchDecision,
    coverage: &SliceCoverage,
    requested: DateRange,
) -> Vec<NaiveDate> {
    let mut days: BTreeSet<NaiveDate> = BTreeSet::new();
    match decision {
        RefetchDecision::UseCache => {}
        RefetchDecision::ReplaceSlice { .. } => days.extend(requested.days()),
        RefetchDecision::GapsOnly => days.extend(coverage.missing_mature_dates.iter().copied()),
        RefetchDecision::Partial { refetch_window, .. } => {
            days.extend(coverage.missing_mature_dates.iter().copied());
            days.extend(refetch_window.days());
        }
    }
    days.into_iter().collect()
}

/// Group days into maximal runs of consecutive calendar days
///
/// Input order does not matter; duplicates are ignored.
#[must_use]
pub fn group_contiguous(dates: &[NaiveDate]) -> Vec<DateRange> {
    let sorted: BTreeSet<NaiveDate> = dates.iter().copied().collect();
    let mut gaps = Vec::new();
    let mut run: Option<(NaiveDate, NaiveDate)> = None;

    for day in sorted {
        run = match run {
            Some((start, end)) if end + Duration::days(1) == day => Some((start, day)),
            Some((start, end)) => {
                gaps.push(DateRange::new(start, end));
                Some((day, day))
            }
            None => Some((day, day)),
        };
    }
    if let Some((start, end)) = run {
        gaps.push(DateRange::new(start, end));
    }
    gaps.into_iter().flatten().collect()
}

/// Contiguous gaps to fetch, ascending
#[must_use]
pub fn plan_gaps(
    decision: &RefetchDecision,
    coverage: &SliceCoverage,
    requested: DateRange,
) -> Vec<DateRange> {
    group_contiguous(&plan_fetch_dates(decision, coverage, requested))
}
