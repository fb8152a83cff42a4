//! Unit-code parsing into a hierarchical classification key.
//!
//! A unit code starts with an age prefix (uppercase letters, digits and
//! underscores, e.g. `NP3`, `P3T1`), optionally followed by underscore-joined
//! tokens carrying a Greek-letter facies name or a lowercase lithology stem.
//! The coarse group key combines the age prefix with whichever secondary token
//! is found first.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Greek-letter token spellings found in survey codes, with canonical forms.
const GREEK_NAMES: &[(&str, &str)] = &[
    ("ALFA", "alfa"),
    ("ALPHA", "alfa"),
    ("BETA", "beta"),
    ("GAMMA", "gamma"),
    ("GAMA", "gamma"),
    ("DELTA", "delta"),
    ("LAMBDA", "lambda"),
    ("MU", "mu"),
];

/// Marker spelling of the Cambrian boundary-interface code (`Є` in print).
pub const CAMBRIAN_INTERFACE: &str = "C_CORTADO";

/// Parser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeParserConfig {
    /// Maximum length of the lowercase lithology stem.
    pub stem_len: usize,
    /// Bare all-caps tokens to skip while scanning for secondary tokens.
    pub ignore_allcaps: BTreeSet<String>,
}

impl Default for CodeParserConfig {
    fn default() -> Self {
        Self {
            stem_len: 2,
            ignore_allcaps: ["C", "D", "E", "A", "B"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// The parse result; a pure function of the code string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCode {
    pub age_code: String,
    /// Canonical Greek token, empty if none found.
    pub greek: String,
    /// Lithology stem, empty if none found.
    pub stem: String,
    /// `age_code`, `age_code|greek`, or `age_code|stem`.
    pub coarse: String,
}

impl ParsedCode {
    /// The secondary token actually used in the coarse key, if any.
    pub fn secondary_token(&self) -> &str {
        if !self.greek.is_empty() {
            &self.greek
        } else {
            &self.stem
        }
    }
}

/// Parses unit-code strings. Stateless apart from its configuration.
#[derive(Debug, Clone, Default)]
pub struct CodeParser {
    config: CodeParserConfig,
}

impl CodeParser {
    pub fn new(config: CodeParserConfig) -> Self {
        Self { config }
    }

    pub fn parse(&self, code: &str) -> ParsedCode {
        let age_code = extract_age_code(code);
        let mut greek = String::new();
        let mut stem = String::new();

        for tok in tokenize_rest(code, &age_code) {
            if is_bare_allcaps(tok) && self.config.ignore_allcaps.contains(tok) {
                continue;
            }
            if greek.is_empty() {
                if let Some(g) = greek_token(tok) {
                    greek = g.to_string();
                    continue;
                }
            }
            if stem.is_empty() {
                if let Some(st) = letters_stem(tok, self.config.stem_len) {
                    stem = st;
                }
            }
            if !greek.is_empty() && !stem.is_empty() {
                break;
            }
        }

        let coarse = if !greek.is_empty() {
            format!("{age_code}|{greek}")
        } else if !stem.is_empty() {
            format!("{age_code}|{stem}")
        } else {
            age_code.clone()
        };

        ParsedCode { age_code, greek, stem, coarse }
    }
}

/// Longest leading run of `[A-Z0-9_]`, extended to absorb the Cambrian
/// interface suffix: a prefix ending in `C_` directly followed by `cortado_`
/// (any case) becomes `…C_CORTADO_`.
fn extract_age_code(code: &str) -> String {
    let end = code
        .find(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'))
        .unwrap_or(code.len());
    let mut base = code[..end].to_string();
    let rest = &code[end..];
    if base.ends_with("C_") {
        if let Some(head) = rest.get(..8) {
            if head.eq_ignore_ascii_case("cortado_") {
                base.push_str("CORTADO_");
            }
        }
    }
    base
}

/// Remainder after the age code, split on underscore runs.
fn tokenize_rest<'a>(code: &'a str, age_code: &str) -> impl Iterator<Item = &'a str> {
    code.get(age_code.len()..)
        .unwrap_or("")
        .trim_start_matches('_')
        .split('_')
        .filter(|t| !t.is_empty())
}

fn is_bare_allcaps(tok: &str) -> bool {
    !tok.is_empty() && tok.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Canonical Greek name for a token, matched case-insensitively with
/// punctuation stripped.
fn greek_token(tok: &str) -> Option<&'static str> {
    let letters: String = tok
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    GREEK_NAMES
        .iter()
        .find(|(name, _)| *name == letters)
        .map(|(_, canon)| *canon)
}

/// Leading lowercase-letter run of a token (after leading digits), truncated
/// to `stem_len`.
fn letters_stem(tok: &str, stem_len: usize) -> Option<String> {
    let tok = tok.trim_matches('_');
    let tok = tok.trim_start_matches(|c: char| c.is_ascii_digit());
    let run: String = tok
        .chars()
        .take_while(|c| c.is_ascii_lowercase())
        .take(stem_len)
        .collect();
    if run.is_empty() {
        None
    } else {
        Some(run)
    }
}
