//! End-to-end decisions over realistic cached parameter files.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use funnel_cache::{
    aggregate_latency, analyze_coverage, compute_evidence, maturity_for, matching_slices,
    plan_gaps, resolve_p_mean, should_refetch, DailyRow, DataSource, LatencyConfig,
    MaturityPolicy, ParameterValue, RefetchDecision, RefetchRequest,
};
use funnel_slice::{canonicalize, DateRange, SliceIdentity};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn retrieved(day: NaiveDate) -> DataSource {
    DataSource {
        source_type: "amplitude".into(),
        retrieved_at: Utc.from_utc_datetime(&day.and_hms_opt(6, 0, 0).unwrap()),
        no_data: false,
    }
}

/// Gaps a window request would fetch against `values`
fn gaps_for(
    values: &[ParameterValue],
    latency: &LatencyConfig,
    dsl: &str,
    reference: NaiveDate,
) -> (RefetchDecision, Vec<DateRange>) {
    let canonical = canonicalize(dsl, reference).unwrap();
    let window = canonical.fetch.range().unwrap();
    let policy = MaturityPolicy::default();
    let decision = should_refetch(
        &RefetchRequest {
            existing_slice: None,
            latency,
            requested_window: window,
            is_cohort_query: false,
            reference_date: reference,
        },
        &policy,
    );
    let matching = matching_slices(values, &SliceIdentity::of(&canonical.fetch));
    let maturity = maturity_for(latency, reference, &policy);
    let coverage = analyze_coverage(&matching, window, maturity.cutoff());
    (decision, plan_gaps(&decision, &coverage, window))
}

#[test]
fn cohort_maturity_boundary() {
    let latency = LatencyConfig::with_t95(7.0);
    let reference = ymd(2025, 12, 9);
    let policy = MaturityPolicy::default();

    let mut at_boundary = ParameterValue::from_rows(
        "cohort(2-Dec-25:2-Dec-25)",
        &[DailyRow::new(ymd(2025, 12, 2), 10, 1)],
    );
    at_boundary.data_source = Some(retrieved(reference));
    let window = DateRange::single(ymd(2025, 12, 2));
    let request = |slice| RefetchRequest {
        existing_slice: slice,
        latency: &latency,
        requested_window: window,
        is_cohort_query: true,
        reference_date: reference,
    };
    assert_eq!(
        should_refetch(&request(Some(&at_boundary)), &policy),
        RefetchDecision::UseCache
    );

    let mut younger = at_boundary.clone();
    younger.dates = vec![ymd(2025, 12, 3)];
    assert!(matches!(
        should_refetch(&request(Some(&younger)), &policy),
        RefetchDecision::ReplaceSlice { .. }
    ));
}

#[test]
fn partially_cached_window_fetches_two_gaps() {
    let mut cached = ParameterValue::from_rows(
        "window(1-Dec-25:3-Dec-25)",
        &[DailyRow::new(ymd(2025, 12, 3), 10, 1)],
    );
    cached.data_source = Some(retrieved(ymd(2025, 12, 4)));

    let (decision, gaps) = gaps_for(
        &[cached],
        &LatencyConfig::default(),
        "window(1-Dec-25:5-Dec-25)",
        ymd(2025, 12, 9),
    );
    assert_eq!(decision, RefetchDecision::GapsOnly);
    assert_eq!(
        gaps,
        vec![
            DateRange::new(ymd(2025, 12, 1), ymd(2025, 12, 2)).unwrap(),
            DateRange::new(ymd(2025, 12, 4), ymd(2025, 12, 5)).unwrap(),
        ]
    );
}

#[test]
fn onset_aggregate_ignores_cohorts() {
    let mut values = Vec::new();
    for onset in [0.0, 1.0, 2.0, 3.0] {
        let key = canonicalize("cohort(-30d:-1d)", ymd(2025, 12, 9)).unwrap().slice_key;
        let mut cohort = ParameterValue::from_rows(key, &[]);
        cohort.onset_delta_days = Some(onset);
        values.push(cohort);
    }
    for (context, onset) in [("ctx:a", 5.0), ("ctx:b", 3.0)] {
        let key = canonicalize(&format!("window(-30d:-1d).context({context})"), ymd(2025, 12, 9))
            .unwrap()
            .slice_key;
        let mut window = ParameterValue::from_rows(key, &[]);
        window.onset_delta_days = Some(onset);
        values.push(window);
    }
    assert_eq!(aggregate_latency(&values).onset_delta_days, Some(3.0));
}

#[test]
fn non_latency_p_mean_is_window_evidence() {
    let mut value = ParameterValue::from_rows(
        "window(1-Jan-25:3-Jan-25)",
        &[
            DailyRow::new(ymd(2025, 1, 1), 100, 10),
            DailyRow::new(ymd(2025, 1, 2), 200, 20),
            DailyRow::new(ymd(2025, 1, 3), 300, 30),
        ],
    );
    value.mean = 0.6;
    let window = DateRange::new(ymd(2025, 1, 1), ymd(2025, 1, 3)).unwrap();
    let evidence = compute_evidence(&[&value], window);
    let p_mean = resolve_p_mean(&LatencyConfig::default(), &evidence, None, true);
    assert!((p_mean - 0.1).abs() < 1e-12);
}

fn fully_cached(window: DateRange) -> ParameterValue {
    let rows: Vec<_> = window.days().map(|d| DailyRow::new(d, 10, 2)).collect();
    let key = format!("window({window})");
    let mut value = ParameterValue::from_rows(key, &rows);
    value.data_source = Some(retrieved(window.end()));
    value
}

proptest! {
    #[test]
    fn fully_covered_mature_window_needs_no_fetch(
        start_offset in 0i64..200,
        len in 0i64..60,
        latency_parameter in any::<bool>(),
        t95 in 1.0f64..20.0,
    ) {
        let reference = ymd(2025, 12, 9);
        let latency = LatencyConfig { latency_parameter, t95: Some(t95) };
        // Window ends before any plausible cutoff
        let end = reference - chrono::Duration::days(40 + start_offset);
        let window = DateRange::new(end - chrono::Duration::days(len), end).unwrap();
        let cached = fully_cached(window);

        let (decision, gaps) = gaps_for(
            &[cached],
            &latency,
            &format!("window({window})"),
            reference,
        );
        prop_assert_eq!(decision, RefetchDecision::GapsOnly);
        prop_assert!(gaps.is_empty());
    }
}

#[test]
fn stale_retrieval_forces_cohort_replace() {
    let latency = LatencyConfig::with_t95(5.0);
    let mut value = ParameterValue::from_rows(
        "cohort(1-Oct-25:2-Oct-25)",
        &[DailyRow::new(ymd(2025, 10, 1), 1, 1)],
    );
    value.data_source = Some(DataSource {
        source_type: "amplitude".into(),
        retrieved_at: DateTime::<Utc>::from_timestamp(1_759_300_000, 0).unwrap(),
        no_data: false,
    });
    let decision = should_refetch(
        &RefetchRequest {
            existing_slice: Some(&value),
            latency: &latency,
            requested_window: DateRange::new(ymd(2025, 10, 1), ymd(2025, 10, 2)).unwrap(),
            is_cohort_query: true,
            reference_date: ymd(2025, 12, 9),
        },
        &MaturityPolicy::default(),
    );
    assert!(matches!(decision, RefetchDecision::ReplaceSlice { .. }));
}
