//! Text normalization for attribute matching.
//!
//! Survey tables mix case, accents, and stray whitespace freely; every lookup
//! key in the crate goes through one of these folds first.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Strip diacritics via NFD decomposition, dropping combining marks.
pub fn fold_diacritics(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Table-lookup key: diacritics stripped, trimmed, lowercase.
pub fn norm_key(s: &str) -> String {
    fold_diacritics(s).trim().to_lowercase()
}

/// Domain-value form: trimmed, diacritics stripped, uppercase.
/// Returns `None` for empty input.
pub fn norm_domain(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    Some(fold_diacritics(t).to_uppercase())
}

/// Canonical-name form: diacritics stripped, whitespace runs collapsed to a
/// single space, uppercase. Empty input maps to the empty string.
pub fn norm_name(s: &str) -> String {
    let folded = fold_diacritics(s.trim());
    let mut out = String::with_capacity(folded.len());
    let mut in_ws = false;
    for c in folded.chars() {
        if c.is_whitespace() {
            in_ws = true;
            continue;
        }
        if in_ws && !out.is_empty() {
            out.push(' ');
        }
        in_ws = false;
        for u in c.to_uppercase() {
            out.push(u);
        }
    }
    out
}
