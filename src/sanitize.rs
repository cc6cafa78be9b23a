//! Identifier sanitizing for metric and label names

use once_cell::sync::Lazy;
use regex::Regex;

static LOWER_UPPER: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());

// "HTTPServer" -> "HTTP_Server"
static ACRONYM_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").unwrap());

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

/// Convert an arbitrary identifier into a lowercase snake_case token
///
/// Word boundaries are camelCase transitions and runs of anything that is
/// not an ASCII letter or digit. Leading and trailing separators are dropped,
/// so `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(text: &str) -> String {
    let split = ACRONYM_WORD.replace_all(text, "${1}_${2}");
    let split = LOWER_UPPER.replace_all(&split, "${1}_${2}");
    let joined = SEPARATORS.replace_all(&split, "_");
    joined.trim_matches('_').to_ascii_lowercase()
}
