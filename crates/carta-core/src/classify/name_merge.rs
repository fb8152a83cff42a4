//! Name-based group reconciliation.
//!
//! Features that share a canonical unit name sometimes land in different
//! coarse groups because their codes were digitized inconsistently. When the
//! cluster is otherwise clean (every member domino-consistent, at most one
//! macro-era) all members are repointed to one dominant group.

use std::collections::BTreeMap;

use crate::classify::domino::MacroEra;
use crate::feature::{Feature, FieldConfig, COL_COARSE, COL_DOMINO_OK, COL_MACRO_ERA};
use crate::text::norm_name;

/// Sum per-group weights over the given feature indices.
fn group_weights(
    features: &[Feature],
    idx: impl Iterator<Item = usize>,
    weights: Option<&[f64]>,
) -> BTreeMap<String, f64> {
    let mut out: BTreeMap<String, f64> = BTreeMap::new();
    for i in idx {
        let grp = features[i].coarse_grp();
        if grp.is_empty() {
            continue;
        }
        let w = weights.map(|ws| ws[i]).unwrap_or(1.0);
        *out.entry(grp.to_string()).or_insert(0.0) += w;
    }
    out
}

/// Repoint every clean name cluster to its dominant coarse group.
///
/// Dominance: highest layer-wide weight, then highest weight within the
/// cluster, then alphabetical order. `weights` holds per-feature area weights;
/// `None` means count weighting.
pub fn merge_names(features: &mut [Feature], fields: &FieldConfig, weights: Option<&[f64]>) {
    let global = group_weights(features, 0..features.len(), weights);

    // Cluster feature indices by normalized name.
    let mut clusters: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, f) in features.iter().enumerate() {
        let name = norm_name(f.get_or_empty(&fields.name));
        if name.is_empty() {
            continue;
        }
        clusters.entry(name).or_default().push(i);
    }

    for members in clusters.values() {
        let mut groups: Vec<&str> = members
            .iter()
            .map(|&i| features[i].coarse_grp())
            .filter(|g| !g.is_empty())
            .collect();
        groups.sort();
        groups.dedup();
        if groups.len() <= 1 {
            continue;
        }
        if members.iter().any(|&i| !features[i].domino_ok()) {
            continue;
        }
        let mut eras: Vec<&str> = members
            .iter()
            .map(|&i| features[i].macro_era())
            .filter(|m| !m.is_empty())
            .collect();
        eras.sort();
        eras.dedup();
        if eras.len() > 1 {
            continue;
        }

        let local = group_weights(features, members.iter().copied(), weights);
        let mut ranked: Vec<(&str, f64, f64)> = groups
            .iter()
            .map(|&g| {
                (
                    g,
                    global.get(g).copied().unwrap_or(0.0),
                    local.get(g).copied().unwrap_or(0.0),
                )
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then(b.2.total_cmp(&a.2))
                .then(a.0.cmp(b.0))
        });
        let canon = ranked[0].0.to_string();

        for &i in members {
            features[i].set(COL_COARSE, canon.clone());
        }
    }
}

/// Force every consistent Cenozoic feature into one fixed group label.
pub fn collapse_cenozoic(features: &mut [Feature], label: &str) {
    let cenozoic = MacroEra::Cenozoic.to_string();
    for f in features.iter_mut() {
        if f.get_or_empty(COL_MACRO_ERA) == cenozoic
            && f.get_or_empty(COL_DOMINO_OK) == "1"
            && !f.coarse_grp().is_empty()
        {
            f.set(COL_COARSE, label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_util::square;
    use crate::feature::COL_COARSE;

    fn classified(code: &str, name: &str, grp: &str, era: &str, ok: &str) -> Feature {
        let mut f = square(0.0, 0.0, 1.0, code);
        f.set("NOME_UNIDA", name);
        f.set(COL_COARSE, grp);
        f.set(COL_MACRO_ERA, era);
        f.set(COL_DOMINO_OK, ok);
        f
    }

    #[test]
    fn cluster_collapses_to_heaviest_group() {
        let fields = FieldConfig::default();
        let mut feats = vec![
            classified("NP3a", "Grupo Bambui", "NP3|alfa", "Pre-Cambrian", "1"),
            classified("NP3b", "Grupo Bambui", "NP3|be", "Pre-Cambrian", "1"),
            classified("NP3a", "Grupo Bambui", "NP3|alfa", "Pre-Cambrian", "1"),
        ];
        merge_names(&mut feats, &fields, None);
        for f in &feats {
            assert_eq!(f.coarse_grp(), "NP3|alfa");
        }
    }

    #[test]
    fn inconsistent_member_blocks_the_merge() {
        let fields = FieldConfig::default();
        let mut feats = vec![
            classified("NP3a", "Grupo X", "NP3|alfa", "Pre-Cambrian", "1"),
            classified("K1b", "Grupo X", "K1|be", "Pre-Cambrian", "0"),
        ];
        merge_names(&mut feats, &fields, None);
        assert_eq!(feats[0].coarse_grp(), "NP3|alfa");
        assert_eq!(feats[1].coarse_grp(), "K1|be");
    }

    #[test]
    fn mixed_macro_eras_block_the_merge() {
        let fields = FieldConfig::default();
        let mut feats = vec![
            classified("NP3a", "Grupo Y", "NP3|alfa", "Pre-Cambrian", "1"),
            classified("K1b", "Grupo Y", "K1|be", "Mesozoic", "1"),
        ];
        merge_names(&mut feats, &fields, None);
        assert_eq!(feats[1].coarse_grp(), "K1|be");
    }

    #[test]
    fn equal_counts_tie_break_alphabetically() {
        let fields = FieldConfig::default();
        let mut feats = vec![
            classified("a", "Unidade Z", "B|x", "Mesozoic", "1"),
            classified("b", "Unidade Z", "A|x", "Mesozoic", "1"),
        ];
        merge_names(&mut feats, &fields, None);
        assert_eq!(feats[0].coarse_grp(), "A|x");
        assert_eq!(feats[1].coarse_grp(), "A|x");
    }

    #[test]
    fn area_weights_override_counts() {
        let fields = FieldConfig::default();
        let mut feats = vec![
            classified("a", "Unidade W", "HEAVY", "Mesozoic", "1"),
            classified("b", "Unidade W", "MANY", "Mesozoic", "1"),
            classified("c", "Unidade W", "MANY", "Mesozoic", "1"),
        ];
        let weights = [10.0, 1.0, 1.0];
        merge_names(&mut feats, &fields, Some(&weights));
        for f in &feats {
            assert_eq!(f.coarse_grp(), "HEAVY");
        }
    }

    #[test]
    fn cenozoic_collapse_only_touches_consistent_features() {
        let mut feats = vec![
            classified("Q2", "a", "Q2", "Cenozoic", "1"),
            classified("N1", "b", "N1|ar", "Cenozoic", "0"),
            classified("K1", "c", "K1", "Mesozoic", "1"),
        ];
        collapse_cenozoic(&mut feats, "CENOZOICO");
        assert_eq!(feats[0].coarse_grp(), "CENOZOICO");
        assert_eq!(feats[1].coarse_grp(), "N1|ar");
        assert_eq!(feats[2].coarse_grp(), "K1");
    }
}
