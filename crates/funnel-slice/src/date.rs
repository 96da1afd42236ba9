//! Day-granularity dates and ranges
//!
//! Two textual forms are accepted:
//! - UK short form `D-MMM-YY` (e.g. `1-Dec-25`), also `D-MMM-YYYY`
//! - relative offsets `-Nd`, `-Nw`, `-Nm`, `-Ny` (and `+N...`), resolved
//!   against a reference date
//!
//! Canonical keys only ever embed the UK form.

use crate::error::DslError;
use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Years a two-digit `YY` can name; keys outside this span would not read back
const KEY_YEARS: std::ops::RangeInclusive<i32> = 2000..=2099;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Format a date as `D-MMM-YY`
#[must_use]
pub fn format_uk_date(date: NaiveDate) -> String {
    format!(
        "{}-{}-{:02}",
        date.day(),
        MONTHS[date.month0() as usize],
        date.year().rem_euclid(100)
    )
}

/// Parse a `D-MMM-YY` (or `D-MMM-YYYY`) date
///
/// Month names are matched case-insensitively. Two-digit years are
/// taken to be in the 2000s; four-digit years must lie in 2000..=2099.
///
/// # Errors
/// Returns [`DslError::InvalidDate`] if the text is not a valid UK date
pub fn parse_uk_date(text: &str) -> Result<NaiveDate, DslError> {
    let invalid = || DslError::InvalidDate(text.to_string());
    let mut parts = text.trim().split('-');
    let (Some(day), Some(month), Some(year), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let day: u32 = day.parse().map_err(|_| invalid())?;
    let month = MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(month))
        .and_then(|idx| u32::try_from(idx + 1).ok())
        .ok_or_else(invalid)?;
    let year: i32 = match year.len() {
        2 => 2000 + year.parse::<i32>().map_err(|_| invalid())?,
        4 => year.parse().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    if !KEY_YEARS.contains(&year) {
        return Err(invalid());
    }

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// Relative offset unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OffsetUnit {
    Days,
    Weeks,
    Months,
    Years,
}

fn parse_relative(expr: &str) -> Option<(i64, OffsetUnit)> {
    let (sign, rest) = match expr.as_bytes().first()? {
        b'-' => (-1, &expr[1..]),
        b'+' => (1, &expr[1..]),
        _ => (1, expr),
    };
    let unit = match rest.chars().last()?.to_ascii_lowercase() {
        'd' => OffsetUnit::Days,
        'w' => OffsetUnit::Weeks,
        'm' => OffsetUnit::Months,
        'y' => OffsetUnit::Years,
        _ => return None,
    };
    let digits = &rest[..rest.len() - 1];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: i64 = digits.parse().ok()?;
    Some((sign * amount, unit))
}

fn shift_months(reference: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months < 0 {
        reference.checked_sub_months(magnitude)
    } else {
        reference.checked_add_months(magnitude)
    }
}

/// Resolve a date expression against a reference date
///
/// Accepts UK dates and relative offsets. Month and year offsets clamp to
/// the end of the target month (`31-Mar-25` minus `1m` is `28-Feb-25`).
///
/// # Errors
/// Returns [`DslError::InvalidDate`] for unrecognised or out-of-range input
pub fn resolve_date_expr(expr: &str, reference: NaiveDate) -> Result<NaiveDate, DslError> {
    let expr = expr.trim();
    let Some((amount, unit)) = parse_relative(expr) else {
        return parse_uk_date(expr);
    };

    let resolved = match unit {
        OffsetUnit::Days => reference.checked_add_signed(Duration::days(amount)),
        OffsetUnit::Weeks => amount
            .checked_mul(7)
            .and_then(|days| reference.checked_add_signed(Duration::days(days))),
        OffsetUnit::Months => shift_months(reference, amount),
        OffsetUnit::Years => amount
            .checked_mul(12)
            .and_then(|months| shift_months(reference, months)),
    };
    resolved
        .filter(|date| KEY_YEARS.contains(&date.year()))
        .ok_or_else(|| DslError::InvalidDate(expr.to_string()))
}

/// Inclusive range of calendar days
///
/// # Invariants
/// - `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Create range, rejecting inverted bounds
    ///
    /// # Errors
    /// Returns [`DslError::InvertedRange`] if `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DslError> {
        if start > end {
            return Err(DslError::inverted(
                format_uk_date(start),
                format_uk_date(end),
            ));
        }
        Ok(Self { start, end })
    }

    /// Range covering exactly one day
    #[inline]
    #[must_use]
    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// First day (inclusive)
    #[inline]
    #[must_use]
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day (inclusive)
    #[inline]
    #[must_use]
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Whether `day` falls inside the range
    #[inline]
    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Number of days covered
    #[inline]
    #[must_use]
    pub fn len_days(&self) -> usize {
        usize::try_from((self.end - self.start).num_days() + 1).unwrap_or(0)
    }

    /// Iterate every day from start to end
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// Same end, later start; `None` if `start` is past the end
    #[must_use]
    pub fn clip_start(&self, start: NaiveDate) -> Option<Self> {
        let start = start.max(self.start);
        (start <= self.end).then_some(Self {
            start,
            end: self.end,
        })
    }

    /// Same end, start moved earlier if `start` precedes the current start
    #[must_use]
    pub fn extend_start(&self, start: NaiveDate) -> Self {
        Self {
            start: start.min(self.start),
            end: self.end,
        }
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            format_uk_date(self.start),
            format_uk_date(self.end)
        )
    }
}
