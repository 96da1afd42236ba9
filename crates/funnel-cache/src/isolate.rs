//! Slice isolation
//!
//! Finds the stored slices that answer a target slice key. Matching is on
//! identity (mode, cohort anchor, context clauses); the window bounds on
//! either side are ignored because the caller supplies the authoritative
//! window separately. No-data markers are ordinary matches.

use crate::model::ParameterValue;
use chrono::NaiveDate;
use funnel_slice::{build_slice_key, parse_constraints, DslError, QuerySignature, SliceIdentity};

/// Slices whose identity matches `target`
///
/// A target without a mode (context-only) matches both window and cohort
/// slices. Unparseable stored keys never match.
#[must_use]
pub fn matching_slices<'a>(
    values: &'a [ParameterValue],
    target: &SliceIdentity,
) -> Vec<&'a ParameterValue> {
    values
        .iter()
        .filter(|value| {
            SliceIdentity::parse(&value.slice_dsl).is_ok_and(|stored| identity_matches(&stored, target))
        })
        .collect()
}

/// Slices answering `target_dsl`, exact key matches preferred
///
/// If any stored key equals the canonical target key only those are
/// returned; otherwise every identity match. What-if clauses in the target
/// are ignored.
///
/// # Errors
/// Returns the parse error when `target_dsl` is not valid DSL
pub fn isolate_slice<'a>(
    values: &'a [ParameterValue],
    target_dsl: &str,
) -> Result<Vec<&'a ParameterValue>, DslError> {
    let parsed = parse_constraints(target_dsl, NaiveDate::default())?;
    let target_key = build_slice_key(&parsed.fetch);
    let identity = SliceIdentity::of(&parsed.fetch);

    let candidates = matching_slices(values, &identity);
    let exact: Vec<_> = candidates
        .iter()
        .copied()
        .filter(|v| v.slice_dsl == target_key)
        .collect();
    Ok(if exact.is_empty() { candidates } else { exact })
}

/// Stored slice whose canonical key is exactly `slice_key`
///
/// Slices written under a different signature are skipped. When several
/// qualify the most recently appended wins.
#[must_use]
pub fn find_slice<'a>(
    values: &'a [ParameterValue],
    slice_key: &str,
    signature: Option<&QuerySignature>,
) -> Option<&'a ParameterValue> {
    values.iter().rev().find(|value| {
        value.matches_signature(signature)
            && parse_constraints(&value.slice_dsl, NaiveDate::default())
                .is_ok_and(|parsed| build_slice_key(&parsed.fetch) == slice_key)
    })
}

fn identity_matches(stored: &SliceIdentity, target: &SliceIdentity) -> bool {
    if stored.context != target.context {
        return false;
    }
    match target.mode {
        None => true,
        Some(mode) => stored.mode == Some(mode) && stored.anchor == target.anchor,
    }
}
