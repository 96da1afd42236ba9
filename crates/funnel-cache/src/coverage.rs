//! Coverage analysis
//!
//! Partitions a requested window into mature and immature days and flags
//! the mature days the cache does not hold.

use crate::model::ParameterValue;
use chrono::NaiveDate;
use funnel_slice::DateRange;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How much of the mature part of a window is cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatureCoverage {
    /// No slice exists
    None,
    /// Some mature days are missing
    Partial,
    /// Every mature day is cached
    Full,
}

/// Result of [`analyze_slice_coverage`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceCoverage {
    /// Mature days absent from the cache, ascending
    pub missing_mature_dates: Vec<NaiveDate>,
    /// Days on or after the cutoff, ascending
    pub immature_dates: Vec<NaiveDate>,
    /// Summary
    pub mature_coverage: MatureCoverage,
}

impl SliceCoverage {
    /// Whether any mature day must be fetched
    #[inline]
    #[must_use]
    pub fn has_missing(&self) -> bool {
        !self.missing_mature_dates.is_empty()
    }
}

/// Coverage of `window` by a single cached slice
#[must_use]
pub fn analyze_slice_coverage(
    slice: Option<&ParameterValue>,
    window: DateRange,
    mature_cutoff: NaiveDate,
) -> SliceCoverage {
    match slice {
        Some(slice) => analyze_coverage(&[slice], window, mature_cutoff),
        None => analyze_coverage(&[], window, mature_cutoff),
    }
}

/// Coverage of `window` by the union of several cached slices
///
/// An empty slice list reports [`MatureCoverage::None`]. No-data markers
/// count as cached.
#[must_use]
pub fn analyze_coverage(
    slices: &[&ParameterValue],
    window: DateRange,
    mature_cutoff: NaiveDate,
) -> SliceCoverage {
    let cached: HashSet<NaiveDate> = slices
        .iter()
        .flat_map(|s| s.dates.iter().copied())
        .collect();

    let (mature, immature): (Vec<_>, Vec<_>) = window.days().partition(|d| *d < mature_cutoff);
    let missing_mature_dates: Vec<_> = mature
        .into_iter()
        .filter(|d| slices.is_empty() || !cached.contains(d))
        .collect();

    let mature_coverage = if slices.is_empty() {
        MatureCoverage::None
    } else if missing_mature_dates.is_empty() {
        MatureCoverage::Full
    } else {
        MatureCoverage::Partial
    };

    SliceCoverage {
        missing_mature_dates,
        immature_dates: immature,
        mature_coverage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DailyRow;
    use pretty_assertions::assert_eq;

    fn dec(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    fn slice(days: &[u32]) -> ParameterValue {
        let rows: Vec<_> = days.iter().map(|d| DailyRow::new(dec(*d), 5, 1)).collect();
        ParameterValue::from_rows("window(1-Dec-25:9-Dec-25)", &rows)
    }

    #[test]
    fn no_slice_is_none_with_all_mature_missing() {
        let window = DateRange::new(dec(1), dec(5)).unwrap();
        let coverage = analyze_slice_coverage(None, window, dec(4));
        assert_eq!(coverage.mature_coverage, MatureCoverage::None);
        assert_eq!(coverage.missing_mature_dates, vec![dec(1), dec(2), dec(3)]);
        assert_eq!(coverage.immature_dates, vec![dec(4), dec(5)]);
    }

    #[test]
    fn partial_and_full() {
        let window = DateRange::new(dec(1), dec(5)).unwrap();
        let cached = slice(&[1, 3]);
        let coverage = analyze_slice_coverage(Some(&cached), window, dec(4));
        assert_eq!(coverage.mature_coverage, MatureCoverage::Partial);
        assert_eq!(coverage.missing_mature_dates, vec![dec(2)]);

        let cached = slice(&[1, 2, 3]);
        let coverage = analyze_slice_coverage(Some(&cached), window, dec(4));
        assert_eq!(coverage.mature_coverage, MatureCoverage::Full);
        assert!(!coverage.has_missing());
    }

    #[test]
    fn union_of_slices() {
        let window = DateRange::new(dec(1), dec(4)).unwrap();
        let a = slice(&[1, 2]);
        let b = slice(&[3, 4]);
        let coverage = analyze_coverage(&[&a, &b], window, NaiveDate::MAX);
        assert_eq!(coverage.mature_coverage, MatureCoverage::Full);
        assert!(coverage.immature_dates.is_empty());
    }

    #[test]
    fn empty_slice_exists_but_covers_nothing() {
        let window = DateRange::new(dec(1), dec(2)).unwrap();
        let cached = slice(&[]);
        let coverage = analyze_slice_coverage(Some(&cached), window, NaiveDate::MAX);
        assert_eq!(coverage.mature_coverage, MatureCoverage::Partial);
        assert_eq!(coverage.missing_mature_dates.len(), 2);
    }
}
