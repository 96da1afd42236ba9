//! Funnel Slice DSL
//!
//! Turns declarative constraint strings into canonical cache keys.
//!
//! # Core Concepts
//!
//! - [`parse_constraints`]: DSL string → [`FetchParts`] + [`WhatIfParts`]
//! - [`build_slice_key`]: [`FetchParts`] → canonical, order-stable key
//! - [`SliceIdentity`]: what a slice *is*, independent of its date bounds
//! - [`QuerySignature`]: hash of the query's meaning, for invalidation
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use funnel_slice::canonicalize;
//!
//! let reference = NaiveDate::from_ymd_opt(2025, 12, 9).unwrap();
//! let canonical = canonicalize(
//!     "case(exp:control).context(channel:google).window(-7d:-1d)",
//!     reference,
//! )
//! .unwrap();
//!
//! assert_eq!(
//!     canonical.slice_key,
//!     "window(2-Dec-25:8-Dec-25).context(channel:google)"
//! );
//! assert_eq!(canonical.what_if, "case(exp:control)");
//! ```

#![warn(unreachable_pub)]

pub mod date;
pub mod dsl;
pub mod error;
pub mod key;
pub mod signature;

pub use date::{format_uk_date, parse_uk_date, resolve_date_expr, DateRange};
pub use dsl::{
    parse_clauses, parse_constraints, CaseClause, Clause, CohortSpec, ContextPair, FetchParts,
    ParsedConstraints, SliceMode, WhatIfParts,
};
pub use error::DslError;
pub use key::{
    build_slice_key, build_what_if, canonicalize, context_key, CanonicalSlice, SliceIdentity,
};
pub use signature::{QueryShape, QuerySignature};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
