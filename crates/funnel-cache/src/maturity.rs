//! Maturity policy
//!
//! A day is *mature* once enough time has passed for its events to be
//! fully counted. Two tests are used:
//!
//! - window days: mature iff strictly before the buffered cutoff
//!   `reference − (maturity_days + boundary_buffer_days)`
//! - cohort days: mature iff at least `maturity_days` old
//!   (a cohort exactly `maturity_days` old is mature)

use crate::model::LatencyConfig;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Maturity used when a parameter has no usable t95
pub const DEFAULT_MATURITY_DAYS: u32 = 30;

/// Extra days subtracted from the window cutoff
pub const DEFAULT_BOUNDARY_BUFFER_DAYS: u32 = 1;

/// Tunable maturity parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaturityPolicy {
    /// Fallback maturity in days
    pub default_maturity_days: u32,
    /// Conservative buffer on the window cutoff
    pub boundary_buffer_days: u32,
}

impl Default for MaturityPolicy {
    fn default() -> Self {
        Self {
            default_maturity_days: DEFAULT_MATURITY_DAYS,
            boundary_buffer_days: DEFAULT_BOUNDARY_BUFFER_DAYS,
        }
    }
}

impl MaturityPolicy {
    /// `ceil(t95)` for latency parameters with a positive t95, else the default
    #[must_use]
    pub fn effective_days(&self, latency: &LatencyConfig) -> u32 {
        match latency.t95 {
            Some(t95) if latency.latency_parameter && t95 > 0.0 => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let days = t95.ceil().min(f64::from(u32::MAX)) as u32;
                days
            }
            _ => self.default_maturity_days,
        }
    }

    /// Maturity view for a parameter at a reference date
    #[must_use]
    pub fn at(&self, latency: &LatencyConfig, reference: NaiveDate) -> Maturity {
        let days = self.effective_days(latency);
        let lag = i64::from(days) + i64::from(self.boundary_buffer_days);
        Maturity {
            days,
            reference,
            cutoff: reference
                .checked_sub_signed(Duration::days(lag))
                .unwrap_or(NaiveDate::MIN),
        }
    }
}

/// Maturity thresholds resolved for one reference date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Maturity {
    days: u32,
    reference: NaiveDate,
    cutoff: NaiveDate,
}

impl Maturity {
    /// Every day counts as mature (non-latency parameters)
    #[must_use]
    pub fn unbounded(reference: NaiveDate) -> Self {
        Self {
            days: 0,
            reference,
            cutoff: NaiveDate::MAX,
        }
    }

    /// Effective maturity in days
    #[inline]
    #[must_use]
    pub fn days(&self) -> u32 {
        self.days
    }

    /// Reference date
    #[inline]
    #[must_use]
    pub fn reference(&self) -> NaiveDate {
        self.reference
    }

    /// First immature window day
    #[inline]
    #[must_use]
    pub fn cutoff(&self) -> NaiveDate {
        self.cutoff
    }

    /// Window-day maturity: strictly before the cutoff
    #[inline]
    #[must_use]
    pub fn is_mature(&self, date: NaiveDate) -> bool {
        date < self.cutoff
    }

    /// Cohort-day maturity: at least `days` old
    #[inline]
    #[must_use]
    pub fn cohort_is_mature(&self, date: NaiveDate) -> bool {
        (self.reference - date).num_days() >= i64::from(self.days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn effective_days_uses_t95_ceiling() {
        let policy = MaturityPolicy::default();
        assert_eq!(policy.effective_days(&LatencyConfig::with_t95(6.2)), 7);
        assert_eq!(policy.effective_days(&LatencyConfig::with_t95(0.0)), 30);
        assert_eq!(policy.effective_days(&LatencyConfig::default()), 30);

        let not_latency = LatencyConfig {
            latency_parameter: false,
            t95: Some(3.0),
        };
        assert_eq!(policy.effective_days(&not_latency), 30);
    }

    #[test]
    fn window_cutoff_has_buffer() {
        let maturity = MaturityPolicy::default().at(&LatencyConfig::with_t95(7.0), ymd(2025, 12, 9));
        assert_eq!(maturity.cutoff(), ymd(2025, 12, 1));
        assert!(maturity.is_mature(ymd(2025, 11, 30)));
        assert!(!maturity.is_mature(ymd(2025, 12, 1)));
    }

    #[test]
    fn cohort_boundary_is_exclusive() {
        let maturity = MaturityPolicy::default().at(&LatencyConfig::with_t95(7.0), ymd(2025, 12, 9));
        assert!(maturity.cohort_is_mature(ymd(2025, 12, 2)));
        assert!(!maturity.cohort_is_mature(ymd(2025, 12, 3)));
    }

    #[test]
    fn buffer_is_tunable() {
        let policy = MaturityPolicy {
            default_maturity_days: 30,
            boundary_buffer_days: 0,
        };
        let maturity = policy.at(&LatencyConfig::with_t95(7.0), ymd(2025, 12, 9));
        assert_eq!(maturity.cutoff(), ymd(2025, 12, 2));
    }

    #[test]
    fn unbounded_is_always_mature() {
        let maturity = Maturity::unbounded(ymd(2025, 12, 9));
        assert!(maturity.is_mature(ymd(2025, 12, 9)));
        assert!(maturity.is_mature(ymd(2030, 1, 1)));
    }
}
