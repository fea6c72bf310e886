//! Repeated-query (N+1) detection over the query texts of one operation.
//!
//! Heuristic: queries are grouped by shape and any shape seen at least
//! `REPEAT_THRESHOLD` times is flagged. Legitimate bulk loops that issue the
//! same statement repeatedly are flagged too.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Occurrences of one shape needed to flag it.
pub const REPEAT_THRESHOLD: usize = 3;

/// Occurrences at which a flagged shape becomes high severity.
pub const HIGH_SEVERITY_THRESHOLD: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    High,
}

impl Severity {
    pub fn for_count(count: usize) -> Self {
        if count >= HIGH_SEVERITY_THRESHOLD {
            Self::High
        } else if count >= REPEAT_THRESHOLD {
            Self::Low
        } else {
            Self::None
        }
    }
}

/// Best guess at what issues the repeated statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatCause {
    /// `... WHERE parent_id = ?` once per parent row
    ForeignKeyLookup,
    /// `... WHERE id = ?` once per item
    PrimaryKeyLookup,
    Other,
}

impl RepeatCause {
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::ForeignKeyLookup => {
                "fetch the related rows in one query (a join or IN (...) on the foreign key) instead of once per parent row"
            }
            Self::PrimaryKeyLookup => "load the rows by primary key with a single IN (...) query",
            Self::Other => {
                "batch the repeated statement or cache its result for the duration of the operation"
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepeatedQuery {
    pub shape: String,
    pub count: usize,
    pub severity: Severity,
    pub cause: RepeatCause,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepeatedQueryReport {
    pub total_queries: usize,
    /// Most repeated first, ties by shape
    pub patterns: Vec<RepeatedQuery>,
    /// Worst severity among the flagged shapes
    pub severity: Severity,
}

impl RepeatedQueryReport {
    pub fn is_flagged(&self) -> bool {
        !self.patterns.is_empty()
    }
}

// ─── Normalization ───────────────────────────────────────────────

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

fn string_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"'(?:[^']|'')*'")
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\$\d+|%s")
}

fn number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\b\d+(?:\.\d+)?\b")
}

fn in_list() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\bin\s*\(\s*\?(?:\s*,\s*\?)*\s*\)")
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\s+")
}

/// Reduce a query to its shape: lowercase, literals and bind markers
/// replaced by `?`, `IN` lists collapsed, whitespace normalized.
pub fn normalize_query(sql: &str) -> String {
    let lowered = sql.to_lowercase();
    let shape = string_literal().replace_all(&lowered, "?");
    let shape = placeholder().replace_all(&shape, "?");
    let shape = number().replace_all(&shape, "?");
    let shape = in_list().replace_all(&shape, "in (?)");
    let shape = whitespace().replace_all(&shape, " ");
    shape.trim().trim_end_matches(';').trim_end().to_owned()
}

fn estimate_cause(shape: &str) -> RepeatCause {
    static FOREIGN_KEY: OnceLock<Regex> = OnceLock::new();
    static PRIMARY_KEY: OnceLock<Regex> = OnceLock::new();

    if regex(&FOREIGN_KEY, r"\b\w+_id\s*=\s*\?").is_match(shape) {
        RepeatCause::ForeignKeyLookup
    } else if regex(&PRIMARY_KEY, r"\bid\s*=\s*\?").is_match(shape) {
        RepeatCause::PrimaryKeyLookup
    } else {
        RepeatCause::Other
    }
}

// ─── Detection ───────────────────────────────────────────────────

pub fn detect_repeated_queries<S: AsRef<str>>(queries: &[S]) -> RepeatedQueryReport {
    let mut shapes: BTreeMap<String, usize> = BTreeMap::new();
    for query in queries {
        let shape = normalize_query(query.as_ref());
        if shape.is_empty() {
            continue;
        }
        *shapes.entry(shape).or_default() += 1;
    }

    let mut patterns: Vec<RepeatedQuery> = shapes
        .into_iter()
        .filter(|(_, count)| *count >= REPEAT_THRESHOLD)
        .map(|(shape, count)| RepeatedQuery {
            cause: estimate_cause(&shape),
            severity: Severity::for_count(count),
            shape,
            count,
        })
        .collect();
    // BTreeMap already ordered by shape; the stable sort keeps that for ties.
    patterns.sort_by(|a, b| b.count.cmp(&a.count));

    let severity = patterns
        .iter()
        .map(|p| p.severity)
        .max()
        .unwrap_or(Severity::None);

    RepeatedQueryReport {
        total_queries: queries.len(),
        patterns,
        severity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_and_whitespace_are_stripped() {
        assert_eq!(
            normalize_query("SELECT *  FROM t\n WHERE id=1"),
            normalize_query("select * from t where id=42")
        );
        assert_eq!(
            normalize_query("SELECT name FROM users WHERE email = 'a''b@x.io';"),
            "select name from users where email = ?"
        );
    }

    #[test]
    fn in_lists_collapse_regardless_of_length() {
        assert_eq!(
            normalize_query("SELECT * FROM t WHERE id IN (1, 2, 3)"),
            normalize_query("SELECT * FROM t WHERE id IN (7)")
        );
    }

    #[test]
    fn identifiers_with_digits_survive() {
        assert_eq!(normalize_query("SELECT * FROM table_2"), "select * from table_2");
    }

    #[test]
    fn severity_scales_with_count() {
        assert_eq!(Severity::for_count(2), Severity::None);
        assert_eq!(Severity::for_count(3), Severity::Low);
        assert_eq!(Severity::for_count(11), Severity::Low);
        assert_eq!(Severity::for_count(12), Severity::High);
    }

    #[test]
    fn cause_estimation() {
        assert_eq!(
            estimate_cause("select * from books where author_id = ?"),
            RepeatCause::ForeignKeyLookup
        );
        assert_eq!(
            estimate_cause("select * from t where id = ?"),
            RepeatCause::PrimaryKeyLookup
        );
        assert_eq!(estimate_cause("select count(*) from t"), RepeatCause::Other);
    }
}
