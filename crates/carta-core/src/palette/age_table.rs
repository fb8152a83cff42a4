//! Age-code color table and its matching rules.
//!
//! The table is authored hierarchically (era → period → code/color) because
//! that is how legends are curated; lookups run against the flattened
//! code→color map, longest token first. Two codes get special predicates: the
//! Permian `P` (easily confused with the Proterozoic prefixes) and the
//! Cambrian interface marker (a substring match anywhere in the code).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classify::code::CAMBRIAN_INTERFACE;
use crate::color::Rgb;

/// One period entry of the hierarchical table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeEntry {
    pub code: String,
    pub color: Rgb,
}

/// Hierarchical era → period name → entry map.
pub type AgeMap = BTreeMap<String, BTreeMap<String, AgeEntry>>;

/// Scan order for equal-length tokens: oldest era first, as the table is
/// authored. Tokens outside the stock timescale scan after these.
const PERIOD_ORDER: [&str; 16] = [
    "A",
    "PP",
    "MP",
    "NP",
    "P",
    "C",
    "D",
    "S",
    "O",
    CAMBRIAN_INTERFACE,
    "K",
    "J",
    "TR",
    "Q",
    "N",
    "PG",
];

fn period_rank(token: &str) -> usize {
    PERIOD_ORDER
        .iter()
        .position(|t| *t == token)
        .unwrap_or(PERIOD_ORDER.len())
}

/// Flattened, match-ready form of the age table.
#[derive(Debug, Clone)]
pub struct AgeTable {
    /// (uppercase code, color), longest code first, timescale order on ties.
    flat: Vec<(String, Rgb)>,
}

impl AgeTable {
    pub fn from_map(map: &AgeMap) -> Self {
        let mut flat: Vec<(String, Rgb)> = map
            .values()
            .flat_map(|periods| periods.values())
            .filter(|e| !e.code.is_empty())
            .map(|e| (e.code.to_ascii_uppercase(), e.color))
            .collect();
        flat.sort_by(|a, b| {
            b.0.len()
                .cmp(&a.0.len())
                .then(period_rank(&a.0).cmp(&period_rank(&b.0)))
                .then(a.0.cmp(&b.0))
        });
        flat.dedup_by(|a, b| a.0 == b.0);
        Self { flat }
    }

    /// Match an age code against the table, longest token first.
    pub fn lookup(&self, age_code: &str) -> Option<Rgb> {
        let code = age_code.to_ascii_uppercase();
        for (token, color) in &self.flat {
            let hit = match token.as_str() {
                "P" => permian_marker(&code),
                CAMBRIAN_INTERFACE => code.contains(CAMBRIAN_INTERFACE),
                t => code.starts_with(t) || code.contains(t),
            };
            if hit {
                return Some(*color);
            }
        }
        // Coarse retry over the canonical period codes, for sparse custom
        // tables whose tokens all missed.
        for t in ["NP", "MP", "PP", "A", "K", "J", "T", "Q", "N", "PG", "D", "S", "O", "C"] {
            if let Some((_, color)) = self.flat.iter().find(|(k, _)| k == t) {
                if code.starts_with(t) || code.contains(t) {
                    return Some(*color);
                }
            }
        }
        None
    }
}

/// A `P` neither preceded nor followed by an uppercase letter.
pub(crate) fn permian_marker(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.iter().enumerate().any(|(i, &c)| {
        c == b'P'
            && (i == 0 || !bytes[i - 1].is_ascii_uppercase())
            && (i + 1 >= bytes.len() || !bytes[i + 1].is_ascii_uppercase())
    })
}

/// The stock geological timescale palette.
pub fn default_age_map() -> AgeMap {
    let entry = |code: &str, hex: &str| AgeEntry {
        code: code.into(),
        color: Rgb::from_hex(hex).expect("static table color"),
    };
    let mut map = AgeMap::new();
    map.insert(
        "Pre-Cambrian".into(),
        BTreeMap::from([
            ("Archean".to_string(), entry("A", "#F4A460")),
            ("Paleoproterozoic".to_string(), entry("PP", "#FFDAB9")),
            ("Mesoproterozoic".to_string(), entry("MP", "#FFA07A")),
            ("Neoproterozoic".to_string(), entry("NP", "#CD5C5C")),
        ]),
    );
    map.insert(
        "Paleozoic".into(),
        BTreeMap::from([
            ("Permian".to_string(), entry("P", "#E6E6E6")),
            ("Carboniferous".to_string(), entry("C", "#99CC99")),
            ("Devonian".to_string(), entry("D", "#FFCC99")),
            ("Silurian".to_string(), entry("S", "#FF9999")),
            ("Ordovician".to_string(), entry("O", "#66CCFF")),
            ("Cambrian".to_string(), entry(CAMBRIAN_INTERFACE, "#33CCCC")),
        ]),
    );
    map.insert(
        "Mesozoic".into(),
        BTreeMap::from([
            ("Cretaceous".to_string(), entry("K", "#FFFF99")),
            ("Jurassic".to_string(), entry("J", "#66FF66")),
            ("Triassic".to_string(), entry("Tr", "#FF6666")),
        ]),
    );
    map.insert(
        "Cenozoic".into(),
        BTreeMap::from([
            ("Quaternary".to_string(), entry("Q", "#FFCCFF")),
            ("Neogene".to_string(), entry("N", "#FF9900")),
            ("Paleogene".to_string(), entry("Pg", "#FFFF66")),
        ]),
    );
    map
}

impl Default for AgeTable {
    fn default() -> Self {
        Self::from_map(&default_age_map())
    }
}
