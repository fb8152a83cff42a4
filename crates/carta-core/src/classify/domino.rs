//! Era/eon range resolution ("domino" consistency).
//!
//! Free-text eon and era range fields are normalized into closed domains, the
//! macro-era is resolved through a fixed decision table, and the result is
//! cross-checked against the macro-era implied by the unit code's leading
//! letters. The matching rules are ordered `(predicate, result)` lists rather
//! than nested conditionals so each rule can be audited in isolation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::code::CAMBRIAN_INTERFACE;
use crate::text::norm_domain;

/// One of the four legend-level macro-eras.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacroEra {
    PreCambrian,
    Paleozoic,
    Mesozoic,
    Cenozoic,
}

impl fmt::Display for MacroEra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MacroEra::PreCambrian => "Pre-Cambrian",
            MacroEra::Paleozoic => "Paleozoic",
            MacroEra::Mesozoic => "Mesozoic",
            MacroEra::Cenozoic => "Cenozoic",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eon {
    Archean,
    Proterozoic,
    Phanerozoic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Era {
    Paleozoic,
    Mesozoic,
    Cenozoic,
}

/// Dominance label derived from the eon range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EonDominance {
    PreCambrian,
    /// Range straddles the pre-Cambrian/Phanerozoic boundary.
    Straddling,
    Phanerozoic,
}

impl fmt::Display for EonDominance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EonDominance::PreCambrian => "Pre-Cambrian",
            EonDominance::Straddling => "Pre-Cambrian|Paleozoic",
            EonDominance::Phanerozoic => "Phanerozoic",
        })
    }
}

/// Stage label derived from the era range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EraStage {
    Pure(Era),
    PaleoMeso,
    MesoCeno,
    Unknown,
}

/// Per-feature inputs, as raw attribute text plus the parsed age code.
#[derive(Debug, Clone, Copy)]
pub struct DominoInput<'a> {
    pub eon_min: &'a str,
    pub eon_max: &'a str,
    pub era_min: &'a str,
    pub era_max: &'a str,
    pub age_code: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DominoResult {
    pub eon_dominance: EonDominance,
    /// Resolved macro-era; `None` when the ranges decide nothing.
    pub macro_era: Option<MacroEra>,
    /// Macro-era implied by the age code alone.
    pub code_era: Option<MacroEra>,
    /// Agreement between `code_era` and `macro_era`.
    pub domino_ok: bool,
}

// ── Domain normalization ──────────────────────────────────────────────────────

/// Accepts both the survey's Portuguese spellings and the English ones.
const EON_DOMAIN: &[(&str, Eon)] = &[
    ("ARQUEANO", Eon::Archean),
    ("ARCHEAN", Eon::Archean),
    ("PROTEROZOICO", Eon::Proterozoic),
    ("PROTEROZOIC", Eon::Proterozoic),
    ("FANEROZOICO", Eon::Phanerozoic),
    ("PHANEROZOIC", Eon::Phanerozoic),
];

const ERA_DOMAIN: &[(&str, Era)] = &[
    ("PALEOZOICO", Era::Paleozoic),
    ("PALEOZOIC", Era::Paleozoic),
    ("MESOZOICO", Era::Mesozoic),
    ("MESOZOIC", Era::Mesozoic),
    ("CENOZOICO", Era::Cenozoic),
    ("CENOZOIC", Era::Cenozoic),
];

fn parse_domain<T: Copy>(raw: &str, domain: &[(&str, T)]) -> Option<T> {
    let norm = norm_domain(raw)?;
    domain.iter().find(|(k, _)| *k == norm).map(|(_, v)| *v)
}

/// Normalize a min/max pair; a single valid endpoint snaps both ends to it.
fn choose_minmax<T: Copy>(
    raw_min: &str,
    raw_max: &str,
    domain: &[(&str, T)],
) -> (Option<T>, Option<T>) {
    let m = parse_domain(raw_min, domain);
    let x = parse_domain(raw_max, domain);
    match (m, x) {
        (None, None) => (None, None),
        (Some(v), None) => (Some(v), Some(v)),
        (None, Some(v)) => (Some(v), Some(v)),
        both => both,
    }
}

// ── Decision tables ───────────────────────────────────────────────────────────

fn eon_dominance(min: Option<Eon>, max: Option<Eon>) -> EonDominance {
    use Eon::*;
    let pre = |e: Eon| matches!(e, Archean | Proterozoic);
    match (min, max) {
        // Unknown pair: the era stage decides downstream.
        (None, None) => EonDominance::Phanerozoic,
        (Some(a), Some(b)) if pre(a) && pre(b) => EonDominance::PreCambrian,
        (Some(a), Some(Phanerozoic)) if pre(a) => EonDominance::Straddling,
        (Some(Phanerozoic), Some(Phanerozoic)) => EonDominance::Phanerozoic,
        (Some(a), Some(b)) => {
            if a == Phanerozoic || b == Phanerozoic {
                EonDominance::Phanerozoic
            } else {
                EonDominance::PreCambrian
            }
        }
        // Unreachable after snapping, but keep the table total.
        _ => EonDominance::Phanerozoic,
    }
}

fn era_stage(min: Option<Era>, max: Option<Era>) -> EraStage {
    use Era::*;
    match (min, max) {
        (None, None) => EraStage::Unknown,
        (Some(Paleozoic), Some(Paleozoic)) => EraStage::Pure(Paleozoic),
        (Some(Paleozoic), Some(Mesozoic)) => EraStage::PaleoMeso,
        (Some(Mesozoic), Some(Mesozoic)) => EraStage::Pure(Mesozoic),
        (Some(Mesozoic), Some(Cenozoic)) => EraStage::MesoCeno,
        (Some(Cenozoic), Some(Cenozoic)) => EraStage::Pure(Cenozoic),
        (Some(a), Some(b)) if a == b => EraStage::Pure(a),
        // Reversed or gapped pairs carry no stage information.
        _ => EraStage::Unknown,
    }
}

// ── Code-marker predicates ────────────────────────────────────────────────────

/// Neoproterozoic marker: a literal `NP` anywhere in the code.
fn has_neoproterozoic(code: &str) -> bool {
    code.contains("NP")
}

/// Permian marker: a `P` neither preceded nor followed by an uppercase letter
/// (digits are fine, so `P3T1` matches but `PP` and `NP` do not).
fn has_permian(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.iter().enumerate().any(|(i, &c)| {
        c == b'P'
            && (i == 0 || !bytes[i - 1].is_ascii_uppercase())
            && (i + 1 >= bytes.len() || !bytes[i + 1].is_ascii_uppercase())
    })
}

/// Cretaceous / undifferentiated Jurassic-Cretaceous marker.
fn has_cretaceous(code: &str) -> bool {
    code.contains('K')
}

// ── Simple macro-era from code prefix ─────────────────────────────────────────

type CodeRule = (fn(&str) -> bool, MacroEra);

/// Ordered prefix rules; the first hit wins. The Cambrian interface marker is
/// checked first wherever it appears, and `NP`/`PP`/`MP` must be claimed as
/// pre-Cambrian before the bare `N` and `P` rules can see them.
const CODE_ERA_RULES: &[CodeRule] = &[
    (|c| c.contains(CAMBRIAN_INTERFACE), MacroEra::Paleozoic),
    (
        |c| starts_with_any(c, &["A", "PP", "MP", "NP"]),
        MacroEra::PreCambrian,
    ),
    (|c| starts_with_any(c, &["J", "K", "T"]), MacroEra::Mesozoic),
    (
        |c| starts_with_any(c, &["Q", "N", "PG", "PL", "PE", "E"]),
        MacroEra::Cenozoic,
    ),
    (
        |c| {
            starts_with_any(c, &["D", "S", "O", "CM"])
                || (c.starts_with('P') && !c.starts_with("PP"))
                || (c.starts_with('C') && !c.starts_with("CC"))
        },
        MacroEra::Paleozoic,
    ),
];

fn starts_with_any(code: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| code.starts_with(p))
}

/// Macro-era implied by the age code's leading letters alone.
pub fn code_era(age_code: &str) -> Option<MacroEra> {
    let code = age_code.to_ascii_uppercase();
    CODE_ERA_RULES
        .iter()
        .find(|(pred, _)| pred(&code))
        .map(|(_, era)| *era)
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// Resolve the macro-era and consistency flag for one feature.
pub fn resolve(input: DominoInput<'_>) -> DominoResult {
    let (eon_min, eon_max) = choose_minmax(input.eon_min, input.eon_max, EON_DOMAIN);
    let (era_min, era_max) = choose_minmax(input.era_min, input.era_max, ERA_DOMAIN);

    let code = input.age_code.to_ascii_uppercase();
    let dominance = eon_dominance(eon_min, eon_max);
    let stage = era_stage(era_min, era_max);

    let macro_era = match dominance {
        EonDominance::PreCambrian => Some(MacroEra::PreCambrian),
        EonDominance::Straddling => {
            if has_neoproterozoic(&code) {
                Some(MacroEra::PreCambrian)
            } else {
                Some(MacroEra::Paleozoic)
            }
        }
        EonDominance::Phanerozoic => match stage {
            EraStage::Pure(Era::Paleozoic) => Some(MacroEra::Paleozoic),
            EraStage::Pure(Era::Mesozoic) => Some(MacroEra::Mesozoic),
            EraStage::Pure(Era::Cenozoic) => Some(MacroEra::Cenozoic),
            EraStage::PaleoMeso => {
                if has_permian(&code) {
                    Some(MacroEra::Paleozoic)
                } else {
                    Some(MacroEra::Mesozoic)
                }
            }
            EraStage::MesoCeno => {
                if has_cretaceous(&code) {
                    Some(MacroEra::Mesozoic)
                } else {
                    Some(MacroEra::Cenozoic)
                }
            }
            EraStage::Unknown => None,
        },
    };

    let simple = code_era(input.age_code);
    // Consistent when the code says nothing, the ranges decide nothing, or
    // both agree.
    let domino_ok = simple.is_none() || macro_era.is_none() || simple == macro_era;

    DominoResult { eon_dominance: dominance, macro_era, code_era: simple, domino_ok }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(eon: (&'a str, &'a str), era: (&'a str, &'a str), code: &'a str) -> DominoInput<'a> {
        DominoInput { eon_min: eon.0, eon_max: eon.1, era_min: era.0, era_max: era.1, age_code: code }
    }

    #[test]
    fn pure_precambrian_eon_wins() {
        let r = resolve(input(("Arqueano", "Proterozóico"), ("", ""), "A4gn"));
        assert_eq!(r.eon_dominance, EonDominance::PreCambrian);
        assert_eq!(r.macro_era, Some(MacroEra::PreCambrian));
        assert!(r.domino_ok);
    }

    #[test]
    fn straddling_eon_disambiguated_by_np_marker() {
        let with_np = resolve(input(("Proterozoico", "Fanerozoico"), ("", ""), "NP3"));
        assert_eq!(with_np.macro_era, Some(MacroEra::PreCambrian));
        let without = resolve(input(("Proterozoico", "Fanerozoico"), ("", ""), "O2"));
        assert_eq!(without.macro_era, Some(MacroEra::Paleozoic));
    }

    #[test]
    fn single_valid_endpoint_snaps_the_pair() {
        let r = resolve(input(("", "Proterozóico"), ("", ""), ""));
        assert_eq!(r.eon_dominance, EonDominance::PreCambrian);
    }

    #[test]
    fn straddling_era_disambiguated_by_markers() {
        // Paleozoic↔Mesozoic: the Permian marker decides.
        let perm = resolve(input(("", ""), ("Paleozóico", "Mesozóico"), "P3T1"));
        assert_eq!(perm.macro_era, Some(MacroEra::Paleozoic));
        let tri = resolve(input(("", ""), ("Paleozóico", "Mesozóico"), "Tr1"));
        assert_eq!(tri.macro_era, Some(MacroEra::Mesozoic));

        // Mesozoic↔Cenozoic: the Cretaceous marker decides.
        let k = resolve(input(("", ""), ("Mesozóico", "Cenozóico"), "K1"));
        assert_eq!(k.macro_era, Some(MacroEra::Mesozoic));
        let n = resolve(input(("", ""), ("Mesozóico", "Cenozóico"), "N2"));
        assert_eq!(n.macro_era, Some(MacroEra::Cenozoic));
    }

    #[test]
    fn permian_marker_rejects_adjacent_uppercase() {
        assert!(has_permian("P"));
        assert!(has_permian("P3T1"));
        assert!(!has_permian("PP"));
        assert!(!has_permian("NP3"));
        assert!(has_permian("N1P2"));
    }

    #[test]
    fn code_era_prefix_table() {
        assert_eq!(code_era("NP3"), Some(MacroEra::PreCambrian));
        assert_eq!(code_era("PP2gr"), Some(MacroEra::PreCambrian));
        assert_eq!(code_era("K1"), Some(MacroEra::Mesozoic));
        assert_eq!(code_era("Tr"), Some(MacroEra::Mesozoic));
        assert_eq!(code_era("N12"), Some(MacroEra::Cenozoic));
        assert_eq!(code_era("PG1"), Some(MacroEra::Cenozoic));
        assert_eq!(code_era("P3T1"), Some(MacroEra::Paleozoic));
        assert_eq!(code_era("O2"), Some(MacroEra::Paleozoic));
        // The interface marker outranks the NP prefix.
        assert_eq!(code_era("NP3C_cortado_"), Some(MacroEra::Paleozoic));
        assert_eq!(code_era("C_CORTADO_"), Some(MacroEra::Paleozoic));
        assert_eq!(code_era(""), None);
    }

    #[test]
    fn domino_flag_matches_code_agreement() {
        // Ranges say Mesozoic, code says Cenozoic: inconsistent.
        let bad = resolve(input(("Fanerozoico", "Fanerozoico"), ("Mesozóico", "Mesozóico"), "Q2"));
        assert_eq!(bad.macro_era, Some(MacroEra::Mesozoic));
        assert!(!bad.domino_ok);

        // Empty code never contradicts.
        let empty = resolve(input(("", ""), ("Mesozóico", "Mesozóico"), ""));
        assert!(empty.domino_ok);

        // Unknown macro-era allows anything.
        let unknown = resolve(input(("", ""), ("", ""), "K1"));
        assert_eq!(unknown.macro_era, None);
        assert!(unknown.domino_ok);
    }

    #[test]
    fn reversed_era_pair_is_unknown() {
        let r = resolve(input(("", ""), ("Cenozóico", "Paleozóico"), ""));
        assert_eq!(r.macro_era, None);
    }
}
