//! Query classification
//!
//! Only `SELECT` statements and `WITH` common-table-expression statements are
//! eligible for optimization. User input only has to start with either
//! keyword. Model output is held to a stricter rule: `WITH` counts only in CTE
//! shape (`WITH name [(cols)] AS (`), so prose such as "With pleasure" or
//! "help with that" is never mistaken for a statement.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;

// CTE name: a quoted identifier (spaces allowed) or any run of non-delimiters
const CTE_HEAD: &str = r#"with\s+(?:recursive\s+)?(?:"[^"]+"|[^\s"(),;]+)\s*(?:\([^()]*\)\s*)?as\s*\("#;

lazy_static! {
    /// Start of a statement anywhere in free text
    pub(crate) static ref STATEMENT_START: Regex =
        Regex::new(&format!(r"(?is)\bselect\b|\b{}", CTE_HEAD)).unwrap();
    static ref LEADING_SELECT: Regex = Regex::new(r"(?i)^select\b").unwrap();
    static ref LEADING_WITH: Regex = Regex::new(r"(?i)^with\s").unwrap();
    static ref LEADING_CTE: Regex = Regex::new(&format!(r"(?is)^{}", CTE_HEAD)).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryClassification {
    Select,
    With,
    Other,
}

impl QueryClassification {
    /// Classify user input after trimming surrounding whitespace
    pub fn classify(query: &str) -> Self {
        let trimmed = query.trim();
        if LEADING_SELECT.is_match(trimmed) {
            QueryClassification::Select
        } else if LEADING_WITH.is_match(trimmed) {
            QueryClassification::With
        } else {
            QueryClassification::Other
        }
    }

    /// Classify a sanitized model response; `WITH` must open a CTE
    pub fn classify_candidate(candidate: &str) -> Self {
        let trimmed = candidate.trim();
        if LEADING_SELECT.is_match(trimmed) {
            QueryClassification::Select
        } else if LEADING_CTE.is_match(trimmed) {
            QueryClassification::With
        } else {
            QueryClassification::Other
        }
    }

    pub fn is_eligible(&self) -> bool {
        !matches!(self, QueryClassification::Other)
    }
}

impl fmt::Display for QueryClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryClassification::Select => write!(f, "SELECT"),
            QueryClassification::With => write!(f, "WITH"),
            QueryClassification::Other => write!(f, "OTHER"),
        }
    }
}
