//! Response Sanitizer
//!
//! Turns free-form model output into one candidate SQL statement:
//!
//! 1. Extraction: drop markdown fences (with or without a language tag) and
//!    `\*` / `\.` escapes, then take the text from the first `SELECT` or CTE
//!    `WITH` up to and including the first `;` that is outside quotes and
//!    comments. Without such a `;` the rest of the text is taken. Text with no
//!    statement start at all is returned as-is (trimmed).
//! 2. Cleanup: strip `TOP n` and `LIMIT n [OFFSET m]` fragments, collapse a
//!    repeated final terminator, trim.
//!
//! The result is a best-effort candidate, not validated SQL.

use crate::query::STATEMENT_START;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    /// A fence, plus its language tag when the tag ends the line
    static ref CODE_FENCE: Regex = Regex::new(r"```(?:([A-Za-z0-9_+-]+)[ \t]*\r?\n)?").unwrap();
    static ref ESCAPED_PUNCTUATION: Regex = Regex::new(r"\\([.*])").unwrap();
    static ref TOP_CLAUSE: Regex = Regex::new(r"(?i)\bTOP\s+\d+\b\s*").unwrap();
    static ref LIMIT_CLAUSE: Regex = Regex::new(r"(?i)\s*\bLIMIT\s+\d+\b(?:\s+OFFSET\s+\d+\b)?").unwrap();
    static ref TRAILING_TERMINATORS: Regex = Regex::new(r";(?:\s*;)+\s*$").unwrap();
    static ref SPACE_BEFORE_TERMINATOR: Regex = Regex::new(r"\s+;$").unwrap();
}

/// Full two-stage sanitization of a raw model response
pub fn sanitize(raw_text: &str) -> String {
    let cleaned = strip_markup(raw_text);
    match extract_statement(&cleaned) {
        Some(candidate) => strip_pagination(candidate),
        None => cleaned,
    }
}

/// Remove code fences and markdown escapes, then trim
pub fn strip_markup(text: &str) -> String {
    let without_fences = CODE_FENCE.replace_all(text, |caps: &Captures| match caps.get(1) {
        // "```SELECT\n..." is a statement glued to the fence, not a tag
        Some(tag) if is_statement_keyword(tag.as_str()) => caps[0][3..].to_string(),
        _ => String::new(),
    });
    ESCAPED_PUNCTUATION
        .replace_all(&without_fences, "$1")
        .trim()
        .to_string()
}

fn is_statement_keyword(word: &str) -> bool {
    word.eq_ignore_ascii_case("select") || word.eq_ignore_ascii_case("with")
}

/// The statement starting at the first `SELECT`/CTE `WITH`, or `None`
pub fn extract_statement(text: &str) -> Option<&str> {
    let start = STATEMENT_START.find(text)?.start();
    let rest = &text[start..];
    match find_terminator(rest) {
        Some(end) => Some(&rest[..=end]),
        None => Some(rest),
    }
}

/// Remove the row-limiting forms the target dialect rejects
pub fn strip_pagination(sql: &str) -> String {
    let sql = TOP_CLAUSE.replace_all(sql.trim(), "");
    let sql = LIMIT_CLAUSE.replace_all(&sql, "");
    let sql = TRAILING_TERMINATORS.replace(&sql, ";");
    let sql = SPACE_BEFORE_TERMINATOR.replace(sql.trim(), ";");
    sql.trim().to_string()
}

/// Byte offset of the first `;` outside string literals, quoted identifiers and comments
fn find_terminator(sql: &str) -> Option<usize> {
    #[derive(PartialEq)]
    enum State {
        Code,
        SingleQuoted,
        DoubleQuoted,
        LineComment,
        BlockComment,
    }

    let bytes = sql.as_bytes();
    let mut state = State::Code;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            State::Code => match b {
                b';' => return Some(i),
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'-' if next == Some(b'-') => {
                    state = State::LineComment;
                    i += 1;
                }
                b'/' if next == Some(b'*') => {
                    state = State::BlockComment;
                    i += 1;
                }
                _ => {}
            },
            // '' inside a literal closes and immediately reopens, which nets out
            State::SingleQuoted => {
                if b == b'\\' {
                    i += 1;
                } else if b == b'\'' {
                    state = State::Code;
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    state = State::Code;
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if b == b'*' && next == Some(b'/') {
                    state = State::Code;
                    i += 1;
                }
            }
        }
        i += 1;
    }
    None
}
