//! Helpers for composing query strings.
//!
//! Queries are markup fragments: `term("foo", "document/title")` yields
//! `<document><title>foo</title></document>`.

use quick_xml::escape::partial_escape;
use serde_json::{Map, Value};

/// Escapes `<`, `>` and `&` in `text` and wraps it in the tags of `path`.
///
/// Other characters meaningful to the query language (`@`, `$`, `"`) are left
/// untouched. An empty path yields the escaped text alone.
pub fn term(text: &str, path: &str) -> String {
    raw_term(&partial_escape(text), path)
}

/// Wraps `text` in the tags of `path` without escaping it.
pub fn raw_term(text: &str, path: &str) -> String {
    let tags: Vec<&str> = path.split('/').filter(|t| !t.is_empty()).collect();

    let mut out = String::with_capacity(text.len() + path.len() * 2 + 8);
    for tag in &tags {
        out.push('<');
        out.push_str(tag);
        out.push('>');
    }
    out.push_str(text);
    for tag in tags.iter().rev() {
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
    out
}

/// Converts a map of paths to texts or nested maps into one query string.
pub fn terms_from_map(source: &Map<String, Value>) -> String {
    let mut out = String::new();
    for (path, value) in source {
        match value {
            Value::Object(nested) => out.push_str(&raw_term(&terms_from_map(nested), path)),
            Value::String(text) => out.push_str(&term(text, path)),
            Value::Null => out.push_str(&raw_term("", path)),
            other => out.push_str(&term(&other.to_string(), path)),
        }
    }
    out
}

/// Joins terms with the AND operator: `(a b)`.
pub fn and_terms<I, S>(terms: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    format!("({})", join(terms))
}

/// Joins terms with the OR operator: `{a b}`.
pub fn or_terms<I, S>(terms: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    format!("{{{}}}", join(terms))
}

/// Negates a term: `~a`.
pub fn not_term(term: &str) -> String {
    format!("~{term}")
}

fn join<I, S>(terms: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    terms
        .into_iter()
        .map(|t| t.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
