//! Slice DSL parser
//!
//! Parses dot-joined constraint strings such as
//! `window(-30d:-1d).context(channel:google).case(exp:control)` into a
//! structured [`ParsedConstraints`], split into:
//!
//! - [`FetchParts`]: constraints that change what the remote query returns
//!   (`window`, `cohort`, `context`, `contextAny`)
//! - [`WhatIfParts`]: constraints applied downstream against the graph
//!   (`case`, `visited`, `visitedAny`, `exclude`)
//!
//! Relative dates are resolved against a reference date at parse time, so
//! parsed parts only ever carry absolute days.

use crate::date::{resolve_date_expr, DateRange};
use crate::error::DslError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// `context(key)` or `context(key:value)`
///
/// A bare key is distinct from any keyed value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextPair {
    /// Context dimension
    pub key: String,
    /// Selected value, `None` for the bare form
    pub value: Option<String>,
}

impl ContextPair {
    /// Keyed context pair
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Bare context key
    #[inline]
    #[must_use]
    pub fn bare(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

impl Display for ContextPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}:{}", self.key, value),
            None => write!(f, "{}", self.key),
        }
    }
}

/// `cohort([anchor,]start:end)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CohortSpec {
    /// Node the cohort entry date is measured at
    pub anchor: Option<String>,
    /// Cohort entry dates
    pub range: DateRange,
}

/// `case(key:value)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaseClause {
    /// Case (experiment) id
    pub key: String,
    /// Selected variant
    pub value: String,
}

/// Query mode of a slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceMode {
    /// Conversions within a calendar range
    Window,
    /// Conversions of users grouped by entry date
    Cohort,
}

/// One parsed clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// `window(start:end)`
    Window(DateRange),
    /// `cohort([anchor,]start:end)`
    Cohort(CohortSpec),
    /// `context(key[:value])`
    Context(ContextPair),
    /// `contextAny(pair,pair,...)`
    ContextAny(Vec<ContextPair>),
    /// `visited(id,...)`
    Visited(Vec<String>),
    /// `visitedAny(id,...)`
    VisitedAny(Vec<String>),
    /// `case(key:value)`
    Case(CaseClause),
    /// `exclude(id,...)`
    Exclude(Vec<String>),
}

/// Fetch-relevant constraints; the only input to a cache key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchParts {
    /// Window bounds, if window-mode
    pub window: Option<DateRange>,
    /// Cohort bounds, if cohort-mode
    pub cohort: Option<CohortSpec>,
    /// Every `context(...)` clause, in input order
    pub context: Vec<ContextPair>,
    /// Every `contextAny(...)` clause, in input order
    pub context_any: Vec<Vec<ContextPair>>,
}

impl FetchParts {
    /// Whether no constraint is present
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window.is_none()
            && self.cohort.is_none()
            && self.context.is_empty()
            && self.context_any.is_empty()
    }

    /// Slice mode, if a window or cohort clause is present
    #[inline]
    #[must_use]
    pub fn mode(&self) -> Option<SliceMode> {
        if self.cohort.is_some() {
            Some(SliceMode::Cohort)
        } else if self.window.is_some() {
            Some(SliceMode::Window)
        } else {
            None
        }
    }

    /// Covering date range of the window or cohort clause
    #[inline]
    #[must_use]
    pub fn range(&self) -> Option<DateRange> {
        self.cohort
            .as_ref()
            .map(|c| c.range)
            .or(self.window)
    }

    /// Cohort anchor node, if any
    #[inline]
    #[must_use]
    pub fn anchor(&self) -> Option<&str> {
        self.cohort.as_ref().and_then(|c| c.anchor.as_deref())
    }

    /// Same constraints with the window/cohort bounds replaced
    ///
    /// A cohort slice keeps its anchor; parts without a mode become
    /// window-mode.
    #[must_use]
    pub fn with_range(&self, range: DateRange) -> Self {
        let mut parts = self.clone();
        match parts.cohort.as_mut() {
            Some(cohort) => cohort.range = range,
            None => parts.window = Some(range),
        }
        parts
    }
}

/// What-if constraints; never part of a cache key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhatIfParts {
    /// Every `case(...)` clause
    pub cases: Vec<CaseClause>,
    /// Node ids from every `visited(...)` clause
    pub visited: Vec<String>,
    /// One group per `visitedAny(...)` clause
    pub visited_any: Vec<Vec<String>>,
    /// Node ids from every `exclude(...)` clause
    pub exclude: Vec<String>,
}

impl WhatIfParts {
    /// Whether no what-if constraint is present
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
            && self.visited.is_empty()
            && self.visited_any.is_empty()
            && self.exclude.is_empty()
    }
}

/// Result of [`parse_constraints`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedConstraints {
    /// Constraints that shape the remote query
    pub fetch: FetchParts,
    /// Constraints applied against the graph
    pub what_if: WhatIfParts,
}

impl ParsedConstraints {
    fn absorb(&mut self, clause: Clause) -> Result<(), DslError> {
        match clause {
            Clause::Window(range) => {
                if self.fetch.cohort.is_some() {
                    return Err(DslError::ConflictingModes);
                }
                if self.fetch.window.replace(range).is_some() {
                    return Err(DslError::DuplicateClause("window"));
                }
            }
            Clause::Cohort(spec) => {
                if self.fetch.window.is_some() {
                    return Err(DslError::ConflictingModes);
                }
                if self.fetch.cohort.replace(spec).is_some() {
                    return Err(DslError::DuplicateClause("cohort"));
                }
            }
            Clause::Context(pair) => self.fetch.context.push(pair),
            Clause::ContextAny(pairs) => self.fetch.context_any.push(pairs),
            Clause::Visited(ids) => self.what_if.visited.extend(ids),
            Clause::VisitedAny(ids) => self.what_if.visited_any.push(ids),
            Clause::Case(case) => self.what_if.cases.push(case),
            Clause::Exclude(ids) => self.what_if.exclude.extend(ids),
        }
        Ok(())
    }
}

/// Parse a constraint string into fetch and what-if parts
///
/// The empty string parses to empty parts.
///
/// # Errors
/// Any malformed clause, unknown clause type, bad date, inverted range,
/// duplicate window/cohort, or window+cohort combination
pub fn parse_constraints(dsl: &str, reference: NaiveDate) -> Result<ParsedConstraints, DslError> {
    let mut parsed = ParsedConstraints::default();
    for clause in parse_clauses(dsl, reference)? {
        parsed.absorb(clause)?;
    }
    Ok(parsed)
}

/// Parse a constraint string into its clauses, in input order
///
/// # Errors
/// See [`parse_constraints`]
pub fn parse_clauses(dsl: &str, reference: NaiveDate) -> Result<Vec<Clause>, DslError> {
    split_top_level(dsl)?
        .into_iter()
        .map(|raw| parse_clause(raw, reference))
        .collect()
}

/// Split on `.` at parenthesis depth zero
fn split_top_level(dsl: &str) -> Result<Vec<&str>, DslError> {
    let trimmed = dsl.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut clauses = Vec::new();
    let mut depth: usize = 0;
    let mut start = 0;
    for (idx, ch) in trimmed.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| DslError::UnbalancedParens(dsl.to_string()))?;
            }
            '.' if depth == 0 => {
                clauses.push(&trimmed[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(DslError::UnbalancedParens(dsl.to_string()));
    }
    clauses.push(&trimmed[start..]);

    if clauses.iter().any(|c| c.trim().is_empty()) {
        return Err(DslError::EmptyClause(dsl.to_string()));
    }
    Ok(clauses.into_iter().map(str::trim).collect())
}

fn parse_clause(raw: &str, reference: NaiveDate) -> Result<Clause, DslError> {
    let malformed = || DslError::MalformedClause(raw.to_string());
    let open = raw.find('(').ok_or_else(malformed)?;
    let body = raw[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
    let name = raw[..open].trim();

    match name {
        "window" => Ok(Clause::Window(parse_range(body, reference)?)),
        "cohort" => parse_cohort(body, reference).map(Clause::Cohort),
        "context" => parse_context_pair(body, "context").map(Clause::Context),
        "contextAny" => split_args(body, "contextAny")?
            .into_iter()
            .map(|arg| parse_context_pair(arg, "contextAny"))
            .collect::<Result<Vec<_>, _>>()
            .map(Clause::ContextAny),
        "visited" => Ok(Clause::Visited(owned_args(body, "visited")?)),
        "visitedAny" => Ok(Clause::VisitedAny(owned_args(body, "visitedAny")?)),
        "case" => parse_case(body).map(Clause::Case),
        "exclude" => Ok(Clause::Exclude(owned_args(body, "exclude")?)),
        "" => Err(malformed()),
        other => Err(DslError::UnknownClause(other.to_string())),
    }
}

/// `start:end`; an empty end means the reference date
fn parse_range(body: &str, reference: NaiveDate) -> Result<DateRange, DslError> {
    let (start, end) = body
        .split_once(':')
        .ok_or_else(|| DslError::MalformedRange(body.to_string()))?;
    if start.trim().is_empty() {
        return Err(DslError::MalformedRange(body.to_string()));
    }
    let start = resolve_date_expr(start, reference)?;
    let end = if end.trim().is_empty() {
        reference
    } else {
        resolve_date_expr(end, reference)?
    };
    DateRange::new(start, end)
}

fn parse_cohort(body: &str, reference: NaiveDate) -> Result<CohortSpec, DslError> {
    match body.rsplit_once(',') {
        Some((anchor, range)) => {
            let anchor = anchor.trim();
            if anchor.is_empty() {
                return Err(DslError::MissingArgument("cohort".to_string()));
            }
            Ok(CohortSpec {
                anchor: Some(anchor.to_string()),
                range: parse_range(range, reference)?,
            })
        }
        None => Ok(CohortSpec {
            anchor: None,
            range: parse_range(body, reference)?,
        }),
    }
}

fn parse_context_pair(arg: &str, clause: &str) -> Result<ContextPair, DslError> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Err(DslError::MissingArgument(clause.to_string()));
    }
    match arg.split_once(':') {
        Some((key, value)) => {
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                return Err(DslError::MalformedClause(format!("{clause}({arg})")));
            }
            Ok(ContextPair::new(key, value))
        }
        None => Ok(ContextPair::bare(arg)),
    }
}

fn parse_case(body: &str) -> Result<CaseClause, DslError> {
    let (key, value) = body
        .split_once(':')
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .ok_or_else(|| DslError::MalformedClause(format!("case({body})")))?;
    Ok(CaseClause {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn split_args<'a>(body: &'a str, clause: &str) -> Result<Vec<&'a str>, DslError> {
    let args: Vec<&str> = body.split(',').map(str::trim).collect();
    if args.iter().any(|a| a.is_empty()) {
        return Err(DslError::MissingArgument(clause.to_string()));
    }
    Ok(args)
}

fn owned_args(body: &str, clause: &str) -> Result<Vec<String>, DslError> {
    Ok(split_args(body, clause)?
        .into_iter()
        .map(str::to_string)
        .collect())
}
