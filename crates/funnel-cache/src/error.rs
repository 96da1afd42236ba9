//! Error types for cached slice values

use chrono::NaiveDate;

/// A stored slice violates one of its structural invariants
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    /// `dates`, `n_daily` and `k_daily` differ in length
    #[error("slice '{slice}': array lengths differ (dates={dates}, n_daily={n_daily}, k_daily={k_daily})")]
    LengthMismatch {
        /// Offending slice key
        slice: String,
        /// `dates.len()`
        dates: usize,
        /// `n_daily.len()`
        n_daily: usize,
        /// `k_daily.len()`
        k_daily: usize,
    },

    /// Header scalar differs from the sum of its daily array
    #[error("slice '{slice}': header {field}={header} but daily sum is {sum}")]
    HeaderDrift {
        /// Offending slice key
        slice: String,
        /// `n` or `k`
        field: &'static str,
        /// Stored header value
        header: u64,
        /// Sum of the daily array
        sum: u64,
    },

    /// Same day stored twice within one slice
    #[error("slice '{slice}': duplicate date {date}")]
    DuplicateDate {
        /// Offending slice key
        slice: String,
        /// Repeated day
        date: NaiveDate,
    },

    /// Same day stored in two slices of the same identity and signature
    #[error("slices '{first}' and '{second}' both hold {date}")]
    OverlappingSlices {
        /// First slice key
        first: String,
        /// Second slice key
        second: String,
        /// Shared day
        date: NaiveDate,
    },
}
