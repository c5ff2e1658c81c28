//! Payload parsing for upstream batch responses
//!
//! The primary endpoint answers with plain batch JSON. The secondary endpoint
//! either does the same (when fronted by the relay) or serves an HTML page that
//! embeds the batch as an escaped JavaScript string literal:
//!
//! ```text
//! var flashData = JSON.parse('{"flash_count": ...');
//! ```
//!
//! [`parse_payload`] accepts both forms.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::models::Batch;
use crate::utils::error::ParseError;

/// Escapes the upstream page uses inside the embedded literal
const EMBEDDED_ESCAPES: &[(&str, char)] = &[
    ("0022", '"'),
    ("002F", '/'),
    ("003C", '<'),
    ("003E", '>'),
    ("0026", '&'),
    ("0027", '\''),
    ("003D", '='),
    ("003A", ':'),
    ("002C", ','),
    ("007B", '{'),
    ("007D", '}'),
    ("005B", '['),
    ("005D", ']'),
];

fn embedded_assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"var flashData = JSON\.parse\('(.+?)'\);").expect("Invalid regex pattern")
    })
}

fn unicode_escape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\u([0-9A-Fa-f]{4})").expect("Invalid regex pattern"))
}

/// Parse a response body that is either batch JSON or an HTML page embedding it
pub fn parse_payload(body: &str) -> Result<Batch, ParseError> {
    if looks_like_json(body) {
        return parse_batch_json(body);
    }

    let json = extract_embedded_json(body)?;
    parse_batch_json(&json)
}

/// Parse plain batch JSON
pub fn parse_batch_json(json: &str) -> Result<Batch, ParseError> {
    Ok(serde_json::from_str(json)?)
}

/// Locate the embedded `flashData` literal in an HTML page and unescape it
pub fn extract_embedded_json(html: &str) -> Result<String, ParseError> {
    let literal = embedded_assignment_re()
        .captures(html)
        .and_then(|caps| caps.get(1))
        .ok_or(ParseError::EmbeddedDataNotFound)?;

    Ok(unescape_embedded(literal.as_str()))
}

/// Replace the structural `\uXXXX` escapes with the characters they stand for
///
/// Escapes outside the known set are left untouched so that the JSON parser
/// can decode them inside string values.
pub fn unescape_embedded(literal: &str) -> String {
    unicode_escape_re()
        .replace_all(literal, |caps: &Captures<'_>| {
            let code = caps[1].to_ascii_uppercase();
            EMBEDDED_ESCAPES
                .iter()
                .find(|(escape, _)| *escape == code)
                .map(|(_, ch)| ch.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn looks_like_json(body: &str) -> bool {
    matches!(body.trim_start().chars().next(), Some('{') | Some('['))
}
