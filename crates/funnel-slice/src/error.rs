//! Error types for slice DSL parsing
//!
//! Every malformed input fails fast: a constraint string either parses
//! completely or not at all.

/// Errors raised while parsing a slice DSL string or a date expression
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DslError {
    /// Clause is not of the form `name(args)`
    #[error("malformed clause: '{0}'")]
    MalformedClause(String),

    /// Clause name is not part of the DSL
    #[error("unknown clause type: '{0}'")]
    UnknownClause(String),

    /// Parentheses do not balance
    #[error("unbalanced parentheses in '{0}'")]
    UnbalancedParens(String),

    /// Two dots in a row, or a leading/trailing dot
    #[error("empty clause in '{0}'")]
    EmptyClause(String),

    /// Date is neither `D-MMM-YY` nor a relative offset
    #[error("invalid date: '{0}'")]
    InvalidDate(String),

    /// Range start is after its end
    #[error("invalid date range: {start} is after {end}")]
    InvertedRange {
        /// Resolved start (UK format)
        start: String,
        /// Resolved end (UK format)
        end: String,
    },

    /// Range body is not `start:end`
    #[error("malformed range: '{0}' (expected start:end)")]
    MalformedRange(String),

    /// Clause requires at least one argument
    #[error("missing argument for {0}(...)")]
    MissingArgument(String),

    /// Single-valued clause given twice
    #[error("duplicate {0}(...) clause")]
    DuplicateClause(&'static str),

    /// A slice is either window-mode or cohort-mode
    #[error("window(...) and cohort(...) cannot be combined")]
    ConflictingModes,
}

impl DslError {
    /// Create inverted range error from resolved bounds
    pub fn inverted(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self::InvertedRange {
            start: start.into(),
            end: end.into(),
        }
    }
}
