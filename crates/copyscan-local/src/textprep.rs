//! Deterministic text normalization used for every comparison.
//!
//! The same function is applied to sentences, snippets and page bodies so that
//! containment checks are symmetric.

/// Canonical comparison key.
///
/// - lowercase
/// - drop every char that is neither alphanumeric nor whitespace (punctuation is
///   removed, not turned into a separator: "don't" -> "dont")
/// - collapse whitespace runs to a single space, trim
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if !ch.is_alphanumeric() {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        for lc in ch.to_lowercase() {
            out.push(lc);
        }
    }
    out
}

/// Whitespace-separated words of an already-normalized string.
pub fn words(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|w| !w.is_empty()).collect()
}
