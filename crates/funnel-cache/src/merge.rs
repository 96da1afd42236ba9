//! Time-series merge engine
//!
//! A pure fold: existing slices plus newly fetched rows in, a new slice
//! list out. Newer data always wins per day.
//!
//! # Algorithm
//! 1. de-duplicate incoming rows by day (last row wins)
//! 2. for every stored slice of the same identity, drop the incoming days
//!    and recompute its totals; drop slices left empty
//! 3. drop same-identity slices written under a different query signature,
//!    and the replaced slice itself on `replace_slice`
//! 4. append one slice holding the incoming rows

use crate::model::{DailyRow, DataSource, ParameterFile, ParameterValue};
use chrono::{DateTime, NaiveDate, Utc};
use funnel_slice::{
    build_slice_key, parse_constraints, DateRange, FetchParts, QuerySignature, SliceIdentity,
    SliceMode,
};
use std::collections::{BTreeMap, HashSet};

/// Everything the merge needs besides the rows themselves
#[derive(Debug, Clone, PartialEq)]
pub struct MergeSpec {
    /// Fetch parts with the window/cohort bounds set to the fetched span
    pub fetch: FetchParts,
    /// Signature of the query that produced the rows
    pub query_signature: Option<QuerySignature>,
    /// Adapter kind for provenance
    pub source_type: String,
    /// Retrieval timestamp
    pub retrieved_at: DateTime<Utc>,
    /// Discard the stored slice with the same key first
    pub replace_slice: bool,
    /// Rows are a "checked, nothing there" marker
    pub no_data: bool,
}

impl MergeSpec {
    /// Create merge spec for rows fetched under `fetch`
    #[must_use]
    pub fn new(fetch: FetchParts, retrieved_at: DateTime<Utc>) -> Self {
        Self {
            fetch,
            query_signature: None,
            source_type: String::new(),
            retrieved_at,
            replace_slice: false,
            no_data: false,
        }
    }

    /// With query signature
    #[must_use]
    pub fn with_signature(mut self, signature: Option<QuerySignature>) -> Self {
        self.query_signature = signature;
        self
    }

    /// With provenance type
    #[must_use]
    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = source_type.into();
        self
    }

    /// Replace the stored slice with the same key
    #[must_use]
    pub fn replacing(mut self, replace: bool) -> Self {
        self.replace_slice = replace;
        self
    }

    /// Mark the rows as a no-data marker
    #[must_use]
    pub fn as_no_data(mut self) -> Self {
        self.no_data = true;
        self
    }

    /// Canonical key of the slice this merge appends
    #[must_use]
    pub fn slice_key(&self) -> String {
        build_slice_key(&self.fetch)
    }
}

/// Zero-count rows for every day of `range`
#[must_use]
pub fn no_data_rows(range: DateRange) -> Vec<DailyRow> {
    range.days().map(DailyRow::empty).collect()
}

/// Fold `new_rows` into `existing`, returning the new slice list
///
/// Stored slices whose keys do not parse are carried over untouched.
#[must_use]
pub fn merge_time_series(
    existing: &[ParameterValue],
    new_rows: &[DailyRow],
    spec: &MergeSpec,
) -> Vec<ParameterValue> {
    let rows: Vec<DailyRow> = new_rows
        .iter()
        .map(|r| (r.date, *r))
        .collect::<BTreeMap<_, _>>()
        .into_values()
        .collect();
    let incoming: HashSet<_> = rows.iter().map(|r| r.date).collect();

    let identity = SliceIdentity::of(&spec.fetch);
    let new_key = spec.slice_key();

    let mut merged: Vec<ParameterValue> = Vec::with_capacity(existing.len() + 1);
    for value in existing {
        let stored_identity = match SliceIdentity::parse(&value.slice_dsl) {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(slice = %value.slice_dsl, error = %err, "Keeping unparseable slice");
                merged.push(value.clone());
                continue;
            }
        };
        if stored_identity != identity {
            merged.push(value.clone());
            continue;
        }
        if !value.matches_signature(spec.query_signature.as_ref()) {
            tracing::debug!(slice = %value.slice_dsl, "Dropping slice with superseded signature");
            continue;
        }
        if spec.replace_slice && canonical_key(&value.slice_dsl).as_deref() == Some(new_key.as_str()) {
            continue;
        }
        if let Some(stripped) = strip_days(value, &incoming) {
            merged.push(stripped);
        }
    }

    if !rows.is_empty() {
        merged.push(new_slice(new_key, &rows, spec));
    }
    merged
}

impl ParameterFile {
    /// Same file with `new_rows` merged in; id and connection untouched
    #[must_use]
    pub fn merged(&self, new_rows: &[DailyRow], spec: &MergeSpec) -> Self {
        self.replace_values(merge_time_series(&self.values, new_rows, spec))
    }
}

fn canonical_key(slice_dsl: &str) -> Option<String> {
    parse_constraints(slice_dsl, NaiveDate::default())
        .ok()
        .map(|parsed| build_slice_key(&parsed.fetch))
}

/// `None` when nothing is left
fn strip_days(value: &ParameterValue, drop: &HashSet<NaiveDate>) -> Option<ParameterValue> {
    if !value.dates.iter().any(|d| drop.contains(d)) {
        return Some(value.clone());
    }
    let kept: Vec<DailyRow> = value.rows().filter(|r| !drop.contains(&r.date)).collect();
    if kept.is_empty() {
        return None;
    }

    let mut stripped = value.clone();
    stripped.dates = kept.iter().map(|r| r.date).collect();
    stripped.n_daily = kept.iter().map(|r| r.n).collect();
    stripped.k_daily = kept.iter().map(|r| r.k).collect();
    stripped.recompute_totals();
    Some(stripped)
}

fn new_slice(key: String, rows: &[DailyRow], spec: &MergeSpec) -> ParameterValue {
    let mut value = ParameterValue::from_rows(key, rows);
    if let Some(range) = spec.fetch.range() {
        match spec.fetch.mode() {
            Some(SliceMode::Cohort) => {
                value.cohort_from = Some(range.start());
                value.cohort_to = Some(range.end());
            }
            _ => {
                value.window_from = Some(range.start());
                value.window_to = Some(range.end());
            }
        }
    }
    value.data_source = Some(DataSource {
        source_type: spec.source_type.clone(),
        retrieved_at: spec.retrieved_at,
        no_data: spec.no_data,
    });
    value.query_signature.clone_from(&spec.query_signature);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_slice::ContextPair;
    use pretty_assertions::assert_eq;

    fn dec(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    fn window(a: u32, b: u32) -> FetchParts {
        FetchParts {
            window: Some(DateRange::new(dec(a), dec(b)).unwrap()),
            ..FetchParts::default()
        }
    }

    fn spec(fetch: FetchParts) -> MergeSpec {
        MergeSpec::new(fetch, DateTime::<Utc>::from_timestamp(1_765_000_000, 0).unwrap())
            .with_source_type("test")
    }

    fn rows(days: &[(u32, u64, u64)]) -> Vec<DailyRow> {
        days.iter().map(|(d, n, k)| DailyRow::new(dec(*d), *n, *k)).collect()
    }

    #[test]
    fn newer_rows_win_and_totals_follow() {
        let first = merge_time_series(&[], &rows(&[(1, 10, 1), (2, 10, 1), (3, 10, 1)]), &spec(window(1, 3)));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].slice_dsl, "window(1-Dec-25:3-Dec-25)");
        assert_eq!(first[0].window_from, Some(dec(1)));

        let second = merge_time_series(&first, &rows(&[(3, 50, 5), (4, 50, 5)]), &spec(window(3, 4)));
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].dates, vec![dec(1), dec(2)]);
        assert_eq!(second[0].n, 20);
        assert_eq!(second[1].dates, vec![dec(3), dec(4)]);
        assert_eq!(second[1].n, 100);
        for value in &second {
            assert!(value.check_invariants().is_ok());
        }
        assert!(ParameterFile::new("p").with_values(second).check_invariants().is_ok());
    }

    #[test]
    fn duplicate_incoming_rows_last_wins() {
        let merged = merge_time_series(&[], &rows(&[(1, 1, 0), (1, 9, 3)]), &spec(window(1, 1)));
        assert_eq!(merged[0].n_daily, vec![9]);
        assert_eq!(merged[0].k, 3);
    }

    #[test]
    fn fully_overwritten_slices_are_dropped() {
        let first = merge_time_series(&[], &rows(&[(2, 1, 1)]), &spec(window(2, 2)));
        let second = merge_time_series(&first, &rows(&[(1, 1, 0), (2, 2, 0)]), &spec(window(1, 2)));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].slice_dsl, "window(1-Dec-25:2-Dec-25)");
    }

    #[test]
    fn other_contexts_untouched() {
        let mut google = window(1, 2);
        google.context.push(ContextPair::new("channel", "google"));
        let first = merge_time_series(&[], &rows(&[(1, 1, 0)]), &spec(google));
        let second = merge_time_series(&first, &rows(&[(1, 5, 5)]), &spec(window(1, 1)));
        assert_eq!(second.len(), 2);
        assert_eq!(second[0], first[0]);
    }

    #[test]
    fn superseded_signature_is_dropped() {
        let old = spec(window(1, 1)).with_signature(Some(QuerySignature::from_hex("aa")));
        let first = merge_time_series(&[], &rows(&[(1, 1, 0)]), &old);
        let new = spec(window(2, 2)).with_signature(Some(QuerySignature::from_hex("bb")));
        let second = merge_time_series(&first, &rows(&[(2, 1, 0)]), &new);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].query_signature, Some(QuerySignature::from_hex("bb")));
    }

    #[test]
    fn replace_slice_discards_same_key() {
        let cohort = parse_constraints("cohort(home,1-Dec-25:3-Dec-25)", dec(9)).unwrap().fetch;
        let first = merge_time_series(&[], &rows(&[(1, 1, 0), (2, 1, 0), (3, 1, 0)]), &spec(cohort.clone()));
        assert_eq!(first[0].cohort_from, Some(dec(1)));
        assert_eq!(first[0].window_from, None);

        let replaced = merge_time_series(&first, &rows(&[(1, 7, 7)]), &spec(cohort).replacing(true));
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].dates, vec![dec(1)]);
        assert_eq!(replaced[0].n, 7);
    }

    #[test]
    fn no_data_marker_written_for_empty_gap() {
        let marker = spec(window(4, 5)).as_no_data();
        let merged = merge_time_series(&[], &no_data_rows(DateRange::new(dec(4), dec(5)).unwrap()), &marker);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].is_no_data());
        assert_eq!(merged[0].dates, vec![dec(4), dec(5)]);
        assert_eq!(merged[0].n, 0);
    }

    #[test]
    fn empty_rows_without_marker_add_nothing() {
        let merged = merge_time_series(&[], &[], &spec(window(1, 2)));
        assert!(merged.is_empty());
    }

    #[test]
    fn unparseable_slices_survive() {
        let junk = ParameterValue::from_rows("not a dsl(", &[]);
        let merged = merge_time_series(&[junk.clone()], &rows(&[(1, 1, 1)]), &spec(window(1, 1)));
        assert_eq!(merged[0], junk);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn file_merge_keeps_identity() {
        let file = ParameterFile::new("conv-rate").with_connection("amplitude-prod");
        let merged = file.merged(&rows(&[(1, 1, 1)]), &spec(window(1, 1)));
        assert_eq!(merged.id, "conv-rate");
        assert_eq!(merged.connection.as_deref(), Some("amplitude-prod"));
        assert_eq!(merged.values.len(), 1);
    }
}
