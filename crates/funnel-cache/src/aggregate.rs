//! Query-time aggregation
//!
//! Evidence is Σk/Σn over the requested window only; the stored header
//! `mean` is provenance and never the answer. Latency figures come from
//! window slices alone.

use crate::maturity::Maturity;
use crate::model::{ratio, DailyRow, Evidence, LatencyConfig, ParameterValue};
use chrono::NaiveDate;
use funnel_slice::{DateRange, SliceIdentity, SliceMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row per day across `values`, later slices overriding earlier ones
fn daily_view(values: &[&ParameterValue], window: DateRange) -> BTreeMap<NaiveDate, DailyRow> {
    let mut days = BTreeMap::new();
    for value in values {
        for row in value.rows().filter(|r| window.contains(r.date)) {
            days.insert(row.date, row);
        }
    }
    days
}

/// Σk/Σn over `window` across the given slices
#[must_use]
pub fn compute_evidence(values: &[&ParameterValue], window: DateRange) -> Evidence {
    let (n, k) = daily_view(values, window)
        .values()
        .fold((0, 0), |(n, k), row| (n + row.n, k + row.k));
    Evidence::from_totals(n, k)
}

/// Σk/Σn over the mature days of `window`; `None` without mature entrants
#[must_use]
pub fn compute_forecast(
    values: &[&ParameterValue],
    window: DateRange,
    mode: SliceMode,
    maturity: &Maturity,
) -> Option<f64> {
    let mature = |day: NaiveDate| match mode {
        SliceMode::Window => maturity.is_mature(day),
        SliceMode::Cohort => maturity.cohort_is_mature(day),
    };
    let (n, k) = daily_view(values, window)
        .values()
        .filter(|row| mature(row.date))
        .fold((0, 0), |(n, k), row| (n + row.n, k + row.k));
    (n > 0).then(|| ratio(k, n))
}

/// Externally visible `p.mean`
///
/// Non-latency parameters and fully mature windows use the evidence;
/// otherwise the forecast when there is one.
#[must_use]
pub fn resolve_p_mean(
    latency: &LatencyConfig,
    evidence: &Evidence,
    forecast: Option<f64>,
    window_fully_mature: bool,
) -> f64 {
    if !latency.latency_parameter || window_fully_mature {
        return evidence.mean;
    }
    forecast.unwrap_or(evidence.mean)
}

/// Aggregate latency figures of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencySummary {
    /// Minimum onset over window slices
    pub onset_delta_days: Option<f64>,
    /// n-weighted median lag over window slices
    pub median_lag_days: Option<f64>,
}

/// Onset and lag over window slices; cohort slices are ignored
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn aggregate_latency(values: &[ParameterValue]) -> LatencySummary {
    let windows: Vec<&ParameterValue> = values.iter().filter(|v| is_window_slice(v)).collect();

    let onset_delta_days = windows
        .iter()
        .filter_map(|v| v.onset_delta_days)
        .reduce(f64::min);

    let lags: Vec<(f64, u64)> = windows
        .iter()
        .filter_map(|v| v.median_lag_days.map(|lag| (lag, v.n)))
        .collect();
    let weight: u64 = lags.iter().map(|(_, n)| n).sum();
    let median_lag_days = if lags.is_empty() {
        None
    } else if weight == 0 {
        Some(lags.iter().map(|(lag, _)| lag).sum::<f64>() / lags.len() as f64)
    } else {
        Some(lags.iter().map(|(lag, n)| lag * *n as f64).sum::<f64>() / weight as f64)
    };

    LatencySummary {
        onset_delta_days,
        median_lag_days,
    }
}

fn is_window_slice(value: &ParameterValue) -> bool {
    match SliceIdentity::parse(&value.slice_dsl) {
        Ok(identity) => identity.mode == Some(SliceMode::Window),
        Err(_) => value.window_from.is_some() && value.cohort_from.is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maturity::MaturityPolicy;

    fn jan(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn evidence_ignores_legacy_header_mean() {
        let mut value = ParameterValue::from_rows(
            "window(1-Jan-25:3-Jan-25)",
            &[
                DailyRow::new(jan(1), 100, 10),
                DailyRow::new(jan(2), 200, 20),
                DailyRow::new(jan(3), 300, 30),
            ],
        );
        value.mean = 0.6;
        let window = DateRange::new(jan(1), jan(3)).unwrap();
        let evidence = compute_evidence(&[&value], window);
        assert_eq!((evidence.n, evidence.k), (600, 60));
        let p = resolve_p_mean(&LatencyConfig::default(), &evidence, None, false);
        assert!(approx(p, 0.1));
    }

    #[test]
    fn evidence_restricted_to_window() {
        let value = ParameterValue::from_rows(
            "window(1-Jan-25:3-Jan-25)",
            &[DailyRow::new(jan(1), 100, 90), DailyRow::new(jan(2), 100, 10)],
        );
        let evidence = compute_evidence(&[&value], DateRange::single(jan(2)));
        assert!(approx(evidence.mean, 0.1));
        assert!(compute_evidence(&[], DateRange::single(jan(2))).is_empty());
    }

    #[test]
    fn later_slice_overrides_day() {
        let old = ParameterValue::from_rows("window(1-Jan-25:1-Jan-25)", &[DailyRow::new(jan(1), 10, 0)]);
        let new = ParameterValue::from_rows("window(1-Jan-25:1-Jan-25)", &[DailyRow::new(jan(1), 10, 5)]);
        let evidence = compute_evidence(&[&old, &new], DateRange::single(jan(1)));
        assert_eq!(evidence.k, 5);
    }

    #[test]
    fn forecast_uses_mature_days_only() {
        let value = ParameterValue::from_rows(
            "window(1-Jan-25:20-Jan-25)",
            &[DailyRow::new(jan(1), 100, 50), DailyRow::new(jan(19), 100, 1)],
        );
        let maturity = MaturityPolicy::default().at(&LatencyConfig::with_t95(7.0), jan(20));
        let window = DateRange::new(jan(1), jan(20)).unwrap();
        let forecast = compute_forecast(&[&value], window, SliceMode::Window, &maturity);
        assert_eq!(forecast, Some(0.5));

        let latency = LatencyConfig::with_t95(7.0);
        let evidence = compute_evidence(&[&value], window);
        assert!(approx(resolve_p_mean(&latency, &evidence, forecast, false), 0.5));
        assert!(approx(resolve_p_mean(&latency, &evidence, forecast, true), evidence.mean));
        assert!(approx(resolve_p_mean(&latency, &evidence, None, false), evidence.mean));

        let young = DateRange::new(jan(19), jan(20)).unwrap();
        assert_eq!(compute_forecast(&[&value], young, SliceMode::Window, &maturity), None);
    }

    #[test]
    fn onset_is_min_over_window_slices_only() {
        let mut values = Vec::new();
        for onset in [0.0, 1.0, 2.0, 3.0] {
            let mut cohort = ParameterValue::from_rows("cohort(1-Nov-25:30-Nov-25)", &[]);
            cohort.onset_delta_days = Some(onset);
            values.push(cohort);
        }
        let mut a = ParameterValue::from_rows("window(1-Nov-25:30-Nov-25).context(ctx:a)", &[]);
        a.onset_delta_days = Some(5.0);
        let mut b = ParameterValue::from_rows("window(1-Nov-25:30-Nov-25).context(ctx:b)", &[]);
        b.onset_delta_days = Some(3.0);
        values.push(a);
        values.push(b);

        let summary = aggregate_latency(&values);
        assert_eq!(summary.onset_delta_days, Some(3.0));
        assert_eq!(summary.median_lag_days, None);
    }

    #[test]
    fn median_lag_is_n_weighted() {
        let mut a = ParameterValue::from_rows("window(1-Jan-25:1-Jan-25)", &[DailyRow::new(jan(1), 300, 0)]);
        a.median_lag_days = Some(2.0);
        let mut b = ParameterValue::from_rows(
            "window(1-Jan-25:1-Jan-25).context(x:y)",
            &[DailyRow::new(jan(1), 100, 0)],
        );
        b.median_lag_days = Some(6.0);
        let mut cohort = ParameterValue::from_rows("cohort(1-Jan-25:1-Jan-25)", &[DailyRow::new(jan(1), 1000, 0)]);
        cohort.median_lag_days = Some(40.0);

        let summary = aggregate_latency(&[a, b, cohort]);
        assert_eq!(summary.median_lag_days, Some(3.0));
    }
}
