//! Parameter files and their cached slices
//!
//! A [`ParameterFile`] is one logical analytics parameter (a conversion
//! rate, say). Each of its [`ParameterValue`]s is one cached time-series
//! slice, keyed by a canonical slice DSL string.
//!
//! # Invariants
//! - `dates.len() == n_daily.len() == k_daily.len()`
//! - `n == Σ n_daily`, `k == Σ k_daily`
//! - no day appears twice within one slice
//! - slices of the same identity and signature never share a day

use crate::error::InvariantError;
use chrono::{DateTime, NaiveDate, Utc};
use funnel_slice::{DateRange, QuerySignature, SliceIdentity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// One day of remote data
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DailyRow {
    /// Day
    pub date: NaiveDate,
    /// Entrants (denominator)
    pub n: u64,
    /// Converters (numerator)
    pub k: u64,
}

impl DailyRow {
    /// Create row
    #[inline]
    #[must_use]
    pub fn new(date: NaiveDate, n: u64, k: u64) -> Self {
        Self { date, n, k }
    }

    /// Row recording "checked, nothing there"
    #[inline]
    #[must_use]
    pub fn empty(date: NaiveDate) -> Self {
        Self { date, n: 0, k: 0 }
    }
}

/// Provenance of a slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    /// Adapter kind that produced the data
    #[serde(rename = "type")]
    pub source_type: String,
    /// When the remote call completed
    pub retrieved_at: DateTime<Utc>,
    /// Remote returned zero rows for the covered days
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_data: bool,
}

/// `{n, k, mean}` over some set of days
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Evidence {
    /// Σn
    pub n: u64,
    /// Σk
    pub k: u64,
    /// k / n, zero when n is zero
    pub mean: f64,
}

impl Evidence {
    /// Evidence from totals
    #[must_use]
    pub fn from_totals(n: u64, k: u64) -> Self {
        Self {
            n,
            k,
            mean: ratio(k, n),
        }
    }

    /// Whether there is no denominator
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn ratio(k: u64, n: u64) -> f64 {
    if n == 0 {
        0.0
    } else {
        k as f64 / n as f64
    }
}

/// Latency configuration of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencyConfig {
    /// Whether conversions lag entry enough for maturity to matter
    #[serde(default)]
    pub latency_parameter: bool,
    /// 95th percentile conversion lag in days
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t95: Option<f64>,
}

impl LatencyConfig {
    /// Latency parameter with a t95 lag
    #[inline]
    #[must_use]
    pub fn with_t95(t95: f64) -> Self {
        Self {
            latency_parameter: true,
            t95: Some(t95),
        }
    }
}

/// One cached time-series slice
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterValue {
    /// Canonical slice key, including the covering window/cohort bounds
    #[serde(rename = "sliceDSL")]
    pub slice_dsl: String,
    /// Retrieved days, ascending
    #[serde(default)]
    pub dates: Vec<NaiveDate>,
    /// Entrants per day, aligned with `dates`
    #[serde(default)]
    pub n_daily: Vec<u64>,
    /// Converters per day, aligned with `dates`
    #[serde(default)]
    pub k_daily: Vec<u64>,
    /// Σ n_daily
    #[serde(default)]
    pub n: u64,
    /// Σ k_daily
    #[serde(default)]
    pub k: u64,
    /// Stored header mean; provenance, not the query answer
    #[serde(default)]
    pub mean: f64,
    /// Window-mode covering span
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_from: Option<NaiveDate>,
    /// Window-mode covering span
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_to: Option<NaiveDate>,
    /// Cohort-mode covering span
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cohort_from: Option<NaiveDate>,
    /// Cohort-mode covering span
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cohort_to: Option<NaiveDate>,
    /// Provenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
    /// Hash of the query shape that produced this slice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_signature: Option<QuerySignature>,
    /// Query-time evidence over the requested window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
    /// Maturity-adjusted mean
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<f64>,
    /// Days between entry and the first conversions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onset_delta_days: Option<f64>,
    /// Median conversion lag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median_lag_days: Option<f64>,
}

impl ParameterValue {
    /// Build a slice from daily rows (rows must be sorted and unique)
    #[must_use]
    pub fn from_rows(slice_dsl: impl Into<String>, rows: &[DailyRow]) -> Self {
        let mut value = Self {
            slice_dsl: slice_dsl.into(),
            dates: rows.iter().map(|r| r.date).collect(),
            n_daily: rows.iter().map(|r| r.n).collect(),
            k_daily: rows.iter().map(|r| r.k).collect(),
            ..Self::default()
        };
        value.recompute_totals();
        value
    }

    /// Daily rows, index-aligned
    pub fn rows(&self) -> impl Iterator<Item = DailyRow> + '_ {
        self.dates
            .iter()
            .zip(&self.n_daily)
            .zip(&self.k_daily)
            .map(|((date, n), k)| DailyRow::new(*date, *n, *k))
    }

    /// Recompute `n`, `k` and `mean` from the daily arrays
    pub fn recompute_totals(&mut self) {
        self.n = self.n_daily.iter().sum();
        self.k = self.k_daily.iter().sum();
        self.mean = ratio(self.k, self.n);
    }

    /// Stored days as a set
    #[must_use]
    pub fn date_set(&self) -> HashSet<NaiveDate> {
        self.dates.iter().copied().collect()
    }

    /// Whether this is a "checked, nothing there" marker
    #[inline]
    #[must_use]
    pub fn is_no_data(&self) -> bool {
        self.data_source.as_ref().is_some_and(|s| s.no_data)
    }

    /// Retrieval timestamp, if known
    #[inline]
    #[must_use]
    pub fn retrieved_at(&self) -> Option<DateTime<Utc>> {
        self.data_source.as_ref().map(|s| s.retrieved_at)
    }

    /// Covering span from the window or cohort bounds
    #[must_use]
    pub fn covering_range(&self) -> Option<DateRange> {
        let (from, to) = match (self.cohort_from, self.cohort_to) {
            (Some(from), Some(to)) => (from, to),
            _ => (self.window_from?, self.window_to?),
        };
        DateRange::new(from, to).ok()
    }

    /// Whether the slice was produced by a query with this signature
    ///
    /// Unsigned legacy slices match any signature.
    #[must_use]
    pub fn matches_signature(&self, signature: Option<&QuerySignature>) -> bool {
        match (&self.query_signature, signature) {
            (Some(stored), Some(wanted)) => stored == wanted,
            _ => true,
        }
    }

    /// Check per-slice invariants
    ///
    /// # Errors
    /// The first violated invariant
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        if self.dates.len() != self.n_daily.len() || self.dates.len() != self.k_daily.len() {
            return Err(InvariantError::LengthMismatch {
                slice: self.slice_dsl.clone(),
                dates: self.dates.len(),
                n_daily: self.n_daily.len(),
                k_daily: self.k_daily.len(),
            });
        }

        let n_sum: u64 = self.n_daily.iter().sum();
        if n_sum != self.n {
            return Err(self.drift("n", self.n, n_sum));
        }
        let k_sum: u64 = self.k_daily.iter().sum();
        if k_sum != self.k {
            return Err(self.drift("k", self.k, k_sum));
        }

        let mut seen = HashSet::with_capacity(self.dates.len());
        if let Some(date) = self.dates.iter().find(|d| !seen.insert(**d)) {
            return Err(InvariantError::DuplicateDate {
                slice: self.slice_dsl.clone(),
                date: *date,
            });
        }
        Ok(())
    }

    fn drift(&self, field: &'static str, header: u64, sum: u64) -> InvariantError {
        InvariantError::HeaderDrift {
            slice: self.slice_dsl.clone(),
            field,
            header,
            sum,
        }
    }
}

/// One logical analytics parameter
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterFile {
    /// Stable parameter id; never changed by a merge
    pub id: String,
    /// Adapter/credentials name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    /// Latency configuration
    #[serde(default)]
    pub latency: LatencyConfig,
    /// Cached slices
    #[serde(default)]
    pub values: Vec<ParameterValue>,
}

impl ParameterFile {
    /// Create empty parameter file
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// With connection name
    #[inline]
    #[must_use]
    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    /// With latency configuration
    #[inline]
    #[must_use]
    pub fn with_latency(mut self, latency: LatencyConfig) -> Self {
        self.latency = latency;
        self
    }

    /// With cached slices
    #[inline]
    #[must_use]
    pub fn with_values(mut self, values: Vec<ParameterValue>) -> Self {
        self.values = values;
        self
    }

    /// Same file with its slices replaced; identity fields untouched
    #[must_use]
    pub fn replace_values(&self, values: Vec<ParameterValue>) -> Self {
        Self {
            id: self.id.clone(),
            connection: self.connection.clone(),
            latency: self.latency,
            values,
        }
    }

    /// Check every slice, then cross-slice overlap per identity+signature
    ///
    /// Slices whose keys do not parse are checked individually only.
    ///
    /// # Errors
    /// The first violated invariant
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let mut owners: HashMap<(SliceIdentity, Option<&QuerySignature>), HashMap<NaiveDate, &str>> =
            HashMap::new();

        for value in &self.values {
            value.check_invariants()?;
            let Ok(identity) = SliceIdentity::parse(&value.slice_dsl) else {
                continue;
            };
            let days = owners
                .entry((identity, value.query_signature.as_ref()))
                .or_default();
            for date in &value.dates {
                if let Some(first) = days.insert(*date, &value.slice_dsl) {
                    return Err(InvariantError::OverlappingSlices {
                        first: first.to_string(),
                        second: value.slice_dsl.clone(),
                        date: *date,
                    });
                }
            }
        }
        Ok(())
    }

    /// Every distinct day cached across all slices
    #[must_use]
    pub fn all_dates(&self) -> BTreeSet<NaiveDate> {
        self.values
            .iter()
            .flat_map(|v| v.dates.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn from_rows_sums_headers() {
        let value = ParameterValue::from_rows(
            "window(1-Jan-25:3-Jan-25)",
            &[
                DailyRow::new(ymd(2025, 1, 1), 100, 10),
                DailyRow::new(ymd(2025, 1, 2), 200, 20),
                DailyRow::new(ymd(2025, 1, 3), 300, 30),
            ],
        );
        assert_eq!(value.n, 600);
        assert_eq!(value.k, 60);
        assert!((value.mean - 0.1).abs() < 1e-12);
        assert!(value.check_invariants().is_ok());
    }

    #[test]
    fn invariant_violations_detected() {
        let mut value = ParameterValue::from_rows(
            "window(1-Jan-25:2-Jan-25)",
            &[
                DailyRow::new(ymd(2025, 1, 1), 10, 1),
                DailyRow::new(ymd(2025, 1, 2), 10, 1),
            ],
        );

        value.n = 99;
        assert!(matches!(
            value.check_invariants(),
            Err(InvariantError::HeaderDrift { field: "n", .. })
        ));

        value.recompute_totals();
        value.dates[1] = ymd(2025, 1, 1);
        assert!(matches!(
            value.check_invariants(),
            Err(InvariantError::DuplicateDate { .. })
        ));

        value.k_daily.pop();
        assert!(matches!(
            value.check_invariants(),
            Err(InvariantError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn file_detects_overlap_within_identity() {
        let a = ParameterValue::from_rows(
            "window(1-Jan-25:2-Jan-25).context(a:1)",
            &[DailyRow::new(ymd(2025, 1, 2), 10, 1)],
        );
        let b = ParameterValue::from_rows(
            "context(a:1).window(2-Jan-25:3-Jan-25)",
            &[DailyRow::new(ymd(2025, 1, 2), 10, 1)],
        );
        let other_context = ParameterValue::from_rows(
            "window(2-Jan-25:3-Jan-25).context(a:2)",
            &[DailyRow::new(ymd(2025, 1, 2), 10, 1)],
        );

        let ok = ParameterFile::new("p").with_values(vec![a.clone(), other_context]);
        assert!(ok.check_invariants().is_ok());

        let bad = ParameterFile::new("p").with_values(vec![a, b]);
        assert!(matches!(
            bad.check_invariants(),
            Err(InvariantError::OverlappingSlices { .. })
        ));
    }

    #[test]
    fn serde_field_names() {
        let mut value = ParameterValue::from_rows(
            "window(1-Jan-25:1-Jan-25)",
            &[DailyRow::new(ymd(2025, 1, 1), 1, 0)],
        );
        value.data_source = Some(DataSource {
            source_type: "amplitude".to_string(),
            retrieved_at: DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap(),
            no_data: false,
        });

        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["sliceDSL"], "window(1-Jan-25:1-Jan-25)");
        assert_eq!(json["dates"][0], "2025-01-01");
        assert_eq!(json["data_source"]["type"], "amplitude");
        assert!(json["data_source"].get("no_data").is_none());

        let back: ParameterValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn unsigned_slices_match_any_signature() {
        let sig = QuerySignature::from_hex("aa");
        let mut value = ParameterValue::default();
        assert!(value.matches_signature(Some(&sig)));
        value.query_signature = Some(QuerySignature::from_hex("bb"));
        assert!(!value.matches_signature(Some(&sig)));
        assert!(value.matches_signature(None));
    }
}
