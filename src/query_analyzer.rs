//! Lexical anti-pattern checks for SQL text.
//!
//! The analyzer never executes or plans a query. It only sees keywords, so
//! it cannot know table sizes, indexes or what a query does at runtime.
//! Text it cannot classify yields an empty, inconclusive verdict.
//!
//! A `WITH` statement is classified and checked by its main statement;
//! the bodies of its common table expressions are not checked.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntiPattern {
    SelectStar,
    MissingWhere,
    UnboundedScan,
    CartesianJoin,
    LeadingWildcardLike,
}

impl AntiPattern {
    pub fn explanation(&self) -> &'static str {
        match self {
            Self::SelectStar => {
                "selects every column; list only the columns the caller needs"
            }
            Self::MissingWhere => {
                "modifies every row of the table because the statement has no WHERE clause"
            }
            Self::UnboundedScan => {
                "reads the whole table with neither WHERE nor LIMIT; large tables will be scanned in full"
            }
            Self::CartesianJoin => {
                "joins tables without a join condition, producing a cartesian product"
            }
            Self::LeadingWildcardLike => {
                "LIKE pattern starts with a wildcard, which prevents index use"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub tag: AntiPattern,
    pub explanation: String,
}

impl Finding {
    fn new(tag: AntiPattern) -> Self {
        Self {
            tag,
            explanation: tag.explanation().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryVerdict {
    pub kind: StatementKind,
    pub findings: Vec<Finding>,
    /// Empty or unrecognized text; no findings were possible.
    pub inconclusive: bool,
}

impl QueryVerdict {
    fn inconclusive(kind: StatementKind) -> Self {
        Self {
            kind,
            findings: Vec::new(),
            inconclusive: true,
        }
    }

    pub fn tags(&self) -> Vec<AntiPattern> {
        self.findings.iter().map(|f| f.tag).collect()
    }

    pub fn has(&self, tag: AntiPattern) -> bool {
        self.findings.iter().any(|f| f.tag == tag)
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

// ─── Lexing helpers ──────────────────────────────────────────────

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

/// Drop comments, keeping string literals intact. Literals and comments
/// are matched in one pass so comment markers inside quotes survive.
fn strip_comments(sql: &str) -> String {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    re(&TOKEN, r"'(?:[^']|'')*'|--[^\n]*|(?s:/\*.*?\*/)")
        .replace_all(sql, |caps: &Captures| {
            let token = &caps[0];
            if token.starts_with('\'') {
                token.to_owned()
            } else {
                " ".to_owned()
            }
        })
        .into_owned()
}

/// Lowercased text with literals blanked and whitespace collapsed.
fn lexical_form(sql: &str) -> String {
    static LITERAL: OnceLock<Regex> = OnceLock::new();
    static SPACE: OnceLock<Regex> = OnceLock::new();
    let blanked = re(&LITERAL, r"'(?:[^']|'')*'").replace_all(sql, "?");
    re(&SPACE, r"\s+")
        .replace_all(&blanked.to_lowercase(), " ")
        .trim()
        .to_owned()
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|w| w == word)
}

fn kind_of(keyword: &str) -> StatementKind {
    match keyword {
        "select" => StatementKind::Select,
        "insert" => StatementKind::Insert,
        "update" => StatementKind::Update,
        "delete" => StatementKind::Delete,
        _ => StatementKind::Other,
    }
}

fn first_word(text: &str) -> &str {
    text.trim_start_matches(|c: char| c == '(' || c.is_whitespace())
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or("")
}

/// Statement kind and the text of the main statement. For `WITH` this is
/// the first top-level statement keyword after the CTE list.
fn main_statement(text: &str) -> (StatementKind, &str) {
    if first_word(text) != "with" {
        return (kind_of(first_word(text)), text);
    }
    ["select", "insert", "update", "delete"]
        .iter()
        .filter_map(|w| find_top_level_word(text, w).map(|at| (at, *w)))
        .min()
        .map(|(at, keyword)| (kind_of(keyword), &text[at..]))
        .unwrap_or((StatementKind::Other, text))
}

/// Text between the first `select` and the first top-level `from`.
fn select_list(text: &str) -> Option<&str> {
    let start = text.find("select")? + "select".len();
    let rest = &text[start..];
    let end = find_top_level_word(rest, "from").unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Byte offset of `word` outside parentheses, on word boundaries.
fn find_top_level_word(text: &str, word: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ if depth == 0 && text[i..].starts_with(word) => {
                let before_ok = i == 0 || !is_ident_byte(bytes[i - 1]);
                let after = i + word.len();
                let after_ok = after >= bytes.len() || !is_ident_byte(bytes[after]);
                if before_ok && after_ok {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

// ─── Rules ───────────────────────────────────────────────────────

/// `TOP n` / `TOP (n)` directly after `SELECT [DISTINCT]`.
fn row_limit_prefix() -> &'static Regex {
    static TOP: OnceLock<Regex> = OnceLock::new();
    re(&TOP, r"^top\s*(?:\(\s*\d+\s*\)|\d+)\s*")
}

fn select_columns(text: &str) -> Option<&str> {
    let list = select_list(text)?;
    let list = list.strip_prefix("distinct ").unwrap_or(list);
    let rest = row_limit_prefix().find(list).map_or(0, |m| m.end());
    Some(&list[rest..])
}

fn has_top(text: &str) -> bool {
    select_list(text)
        .map(|list| list.strip_prefix("distinct ").unwrap_or(list))
        .is_some_and(|list| row_limit_prefix().is_match(list))
}

fn selects_star(text: &str) -> bool {
    let Some(list) = select_columns(text) else {
        return false;
    };
    split_top_level(list, ',').iter().any(|column| {
        let column = column.trim();
        column == "*" || column.ends_with(".*")
    })
}

fn is_aggregate_only(text: &str) -> bool {
    static AGGREGATE: OnceLock<Regex> = OnceLock::new();
    let Some(list) = select_columns(text) else {
        return false;
    };
    !has_word(text, "group")
        && split_top_level(list, ',').iter().all(|column| {
            re(&AGGREGATE, r"^(count|sum|avg|min|max)\s*\(").is_match(column.trim())
        })
}

fn unbounded_scan(text: &str) -> bool {
    has_word(text, "from")
        && !has_word(text, "where")
        && !has_word(text, "limit")
        && !has_top(text)
        && !text.contains("fetch first")
        && !is_aggregate_only(text)
}

/// A JOIN without ON/USING, or a comma-separated FROM list, with no WHERE
/// anywhere that could carry the join condition.
fn cartesian_join(text: &str) -> bool {
    if has_word(text, "where") {
        return false;
    }

    let segments: Vec<&str> = text.split(" join ").collect();
    for pair in segments.windows(2) {
        let (before, after) = (pair[0], pair[1]);
        if before.ends_with(" cross") || before.ends_with(" natural") {
            continue;
        }
        if !has_word(after, "on") && !has_word(after, "using") {
            return true;
        }
    }

    from_clause(text)
        .map(|from| split_top_level(from, ',').len() > 1)
        .unwrap_or(false)
}

fn from_clause(text: &str) -> Option<&str> {
    let start = find_top_level_word(text, "from")? + "from".len();
    let rest = &text[start..];
    let end = [
        "where", "group", "order", "limit", "having", "join", "left", "right", "inner", "outer",
        "full", "cross", "natural", "union",
    ]
    .iter()
    .filter_map(|w| find_top_level_word(rest, w))
    .min()
    .unwrap_or(rest.len());
    Some(&rest[..end])
}

fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn leading_wildcard_like(uncommented: &str) -> bool {
    static LIKE: OnceLock<Regex> = OnceLock::new();
    re(&LIKE, r"(?i)\blike\s+'%").is_match(uncommented)
}

// ─── Entry point ─────────────────────────────────────────────────

pub struct QueryAnalyzer;

impl QueryAnalyzer {
    pub fn analyze(sql: &str) -> QueryVerdict {
        let uncommented = strip_comments(sql);
        let text = lexical_form(&uncommented);
        if text.is_empty() {
            return QueryVerdict::inconclusive(StatementKind::Other);
        }

        let (kind, body) = main_statement(&text);
        let mut tags = Vec::new();
        match kind {
            StatementKind::Select => {
                if selects_star(body) {
                    tags.push(AntiPattern::SelectStar);
                }
                if unbounded_scan(body) {
                    tags.push(AntiPattern::UnboundedScan);
                }
                if cartesian_join(body) {
                    tags.push(AntiPattern::CartesianJoin);
                }
            }
            StatementKind::Update | StatementKind::Delete => {
                if !has_word(body, "where") {
                    tags.push(AntiPattern::MissingWhere);
                }
            }
            StatementKind::Insert => {}
            StatementKind::Other => return QueryVerdict::inconclusive(kind),
        }
        if leading_wildcard_like(&uncommented) {
            tags.push(AntiPattern::LeadingWildcardLike);
        }

        QueryVerdict {
            kind,
            findings: tags.into_iter().map(Finding::new).collect(),
            inconclusive: false,
        }
    }
}

pub fn analyze_query(sql: &str) -> QueryVerdict {
    QueryAnalyzer::analyze(sql)
}
