//! Canonical slice keys
//!
//! [`build_slice_key`] is the left inverse of the parser: semantically
//! identical constraint sets always serialize to byte-identical strings.
//! Clause order is fixed (`window`/`cohort`, then `context`, then
//! `contextAny`), entries within a clause type are sorted and de-duplicated.
//!
//! Round-trip law: `build(parse(build(p))) == build(p)`.

use crate::dsl::{parse_constraints, CaseClause, ContextPair, FetchParts, SliceMode, WhatIfParts};
use crate::error::DslError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

/// Serialize fetch parts into the canonical cache key
///
/// Empty parts produce the empty string.
#[must_use]
pub fn build_slice_key(parts: &FetchParts) -> String {
    let mut clauses = Vec::new();
    if let Some(window) = &parts.window {
        clauses.push(format!("window({window})"));
    }
    if let Some(cohort) = &parts.cohort {
        clauses.push(match &cohort.anchor {
            Some(anchor) => format!("cohort({anchor},{})", cohort.range),
            None => format!("cohort({})", cohort.range),
        });
    }
    clauses.extend(context_clauses(parts));
    clauses.join(".")
}

/// Canonical key of the context constraints alone (no window/cohort)
#[must_use]
pub fn context_key(parts: &FetchParts) -> String {
    context_clauses(parts).join(".")
}

fn context_clauses(parts: &FetchParts) -> Vec<String> {
    let contexts: BTreeSet<&ContextPair> = parts.context.iter().collect();
    let groups: BTreeSet<String> = parts
        .context_any
        .iter()
        .map(|group| join_sorted(group.iter().map(ToString::to_string)))
        .collect();

    contexts
        .into_iter()
        .map(|pair| format!("context({pair})"))
        .chain(groups.into_iter().map(|g| format!("contextAny({g})")))
        .collect()
}

fn join_sorted(items: impl Iterator<Item = String>) -> String {
    items
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(",")
}

/// Serialize what-if parts in canonical order, for display
///
/// Order: `visited`, `visitedAny`, `case`, `exclude`.
#[must_use]
pub fn build_what_if(parts: &WhatIfParts) -> String {
    let mut clauses = Vec::new();
    if !parts.visited.is_empty() {
        clauses.push(format!(
            "visited({})",
            join_sorted(parts.visited.iter().cloned())
        ));
    }
    let any_groups: BTreeSet<String> = parts
        .visited_any
        .iter()
        .map(|group| join_sorted(group.iter().cloned()))
        .collect();
    clauses.extend(any_groups.into_iter().map(|g| format!("visitedAny({g})")));

    let cases: BTreeSet<&CaseClause> = parts.cases.iter().collect();
    clauses.extend(
        cases
            .into_iter()
            .map(|c| format!("case({}:{})", c.key, c.value)),
    );
    if !parts.exclude.is_empty() {
        clauses.push(format!(
            "exclude({})",
            join_sorted(parts.exclude.iter().cloned())
        ));
    }
    clauses.join(".")
}

/// Identity of a slice, independent of its date bounds
///
/// Two stored values with equal identity hold data for the same query
/// population, so their dates must never overlap after a merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SliceIdentity {
    /// Window or cohort
    pub mode: Option<SliceMode>,
    /// Cohort anchor
    pub anchor: Option<String>,
    /// Canonical context clauses
    pub context: String,
}

impl SliceIdentity {
    /// Identity of parsed fetch parts
    #[must_use]
    pub fn of(parts: &FetchParts) -> Self {
        Self {
            mode: parts.mode(),
            anchor: parts.anchor().map(str::to_string),
            context: context_key(parts),
        }
    }

    /// Identity of a stored slice key
    ///
    /// Stored keys embed absolute dates, so the reference date is irrelevant.
    ///
    /// # Errors
    /// Returns the parse error if the stored key is not valid DSL
    pub fn parse(slice_key: &str) -> Result<Self, DslError> {
        let reference = NaiveDate::default();
        parse_constraints(slice_key, reference).map(|parsed| Self::of(&parsed.fetch))
    }
}

impl Display for SliceIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mode = match (self.mode, &self.anchor) {
            (Some(SliceMode::Cohort), Some(anchor)) => format!("cohort({anchor})"),
            (Some(SliceMode::Cohort), None) => "cohort".to_string(),
            (Some(SliceMode::Window), _) => "window".to_string(),
            (None, _) => "any".to_string(),
        };
        if self.context.is_empty() {
            write!(f, "{mode}")
        } else {
            write!(f, "{mode}|{}", self.context)
        }
    }
}

/// Canonical split of a DSL string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSlice {
    /// Cache key (fetch-relevant constraints, absolute dates)
    pub slice_key: String,
    /// Canonical what-if constraints
    pub what_if: String,
    /// Parsed fetch parts
    pub fetch: FetchParts,
    /// Parsed what-if parts
    pub what_if_parts: WhatIfParts,
}

/// Parse and canonicalize a DSL string in one step
///
/// # Errors
/// See [`parse_constraints`]
pub fn canonicalize(dsl: &str, reference: NaiveDate) -> Result<CanonicalSlice, DslError> {
    let parsed = parse_constraints(dsl, reference)?;
    Ok(CanonicalSlice {
        slice_key: build_slice_key(&parsed.fetch),
        what_if: build_what_if(&parsed.what_if),
        fetch: parsed.fetch,
        what_if_parts: parsed.what_if,
    })
}
