//! Classification pipeline.
//!
//! Per-feature stages first (code parsing, domino resolution), then the
//! cross-feature reconciliation passes (name merge, Cenozoic collapse).
//! Classification always produces a fresh collection with the derived columns
//! appended; group membership is recomputed from the columns downstream, never
//! patched incrementally.

pub mod code;
pub mod domino;
pub mod name_merge;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CartaError;
use crate::feature::{
    FeatureCollection, FieldConfig, COL_AGE_CODE, COL_CODE_ERA, COL_COARSE, COL_DOMINO_OK,
    COL_EON_DOMINO, COL_GREEK, COL_MACRO_ERA, COL_STEM,
};
use crate::frame::{area_weights, Projection};
use code::{CodeParser, CodeParserConfig};
use domino::{DominoInput, DominoResult};

/// What to do with features whose code contradicts their declared ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforceMode {
    /// Keep the group, record `domino_ok = 0`.
    #[default]
    Flag,
    /// Clear the coarse group of inconsistent features.
    Mask,
}

/// Options for one classification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyOptions {
    pub enforce: EnforceMode,
    pub name_merge: bool,
    /// Weight name-merge dominance by ground area instead of feature count.
    pub name_merge_area_weighted: bool,
    pub collapse_cenozoic: bool,
    pub collapse_cenozoic_label: String,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            enforce: EnforceMode::Flag,
            name_merge: true,
            name_merge_area_weighted: false,
            collapse_cenozoic: false,
            collapse_cenozoic_label: "CENOZOICO".into(),
        }
    }
}

/// The classification engine: code parser plus field bindings.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    parser: CodeParser,
    fields: FieldConfig,
}

impl Classifier {
    pub fn new(parser_config: CodeParserConfig, fields: FieldConfig) -> Self {
        Self { parser: CodeParser::new(parser_config), fields }
    }

    pub fn fields(&self) -> &FieldConfig {
        &self.fields
    }

    /// Classify a collection: appends `age_code`, `greek`, `stem`,
    /// `coarse_grp`, `code_era`, `eon_domino`, `macro_era`, `domino_ok`, and
    /// the lowercase code alias column.
    ///
    /// `area_frame` is only consulted when `name_merge_area_weighted` is set;
    /// weighting degrades to equal weights when no metric frame exists.
    pub fn classify(
        &self,
        fc: &FeatureCollection,
        opts: &ClassifyOptions,
        area_frame: Option<Arc<dyn Projection>>,
    ) -> Result<FeatureCollection, CartaError> {
        if fc.is_empty() {
            return Err(CartaError::EmptyCollection);
        }
        for col in [
            &self.fields.code,
            &self.fields.eon_min,
            &self.fields.eon_max,
            &self.fields.era_min,
            &self.fields.era_max,
        ] {
            fc.require_column(col)?;
        }

        let mut out = fc.clone();
        for f in &mut out.features {
            let code = f.get_or_empty(&self.fields.code).to_string();
            let parsed = self.parser.parse(&code);
            let DominoResult { eon_dominance, macro_era, code_era, domino_ok } =
                domino::resolve(DominoInput {
                    eon_min: f.get_or_empty(&self.fields.eon_min),
                    eon_max: f.get_or_empty(&self.fields.eon_max),
                    era_min: f.get_or_empty(&self.fields.era_min),
                    era_max: f.get_or_empty(&self.fields.era_max),
                    age_code: &parsed.age_code,
                });

            f.set(&self.fields.code_alias, code);
            f.set(COL_AGE_CODE, parsed.age_code.clone());
            f.set(COL_GREEK, parsed.greek.clone());
            f.set(COL_STEM, parsed.stem.clone());
            f.set(COL_COARSE, parsed.coarse.clone());
            f.set(COL_CODE_ERA, code_era.map(|e| e.to_string()).unwrap_or_default());
            f.set(COL_EON_DOMINO, eon_dominance.to_string());
            f.set(COL_MACRO_ERA, macro_era.map(|e| e.to_string()).unwrap_or_default());
            f.set(COL_DOMINO_OK, if domino_ok { "1" } else { "0" });

            if opts.enforce == EnforceMode::Mask && !domino_ok {
                f.set(COL_COARSE, "");
            }
        }

        if opts.name_merge && out.has_column(&self.fields.name) {
            let weights = if opts.name_merge_area_weighted {
                Some(area_weights(&out, area_frame).0)
            } else {
                None
            };
            name_merge::merge_names(&mut out.features, &self.fields, weights.as_deref());
        }

        if opts.collapse_cenozoic {
            name_merge::collapse_cenozoic(&mut out.features, &opts.collapse_cenozoic_label);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_util::square;
    use crate::feature::{Crs, Feature};

    fn raw(code: &str, name: &str, eon: (&str, &str), era: (&str, &str)) -> Feature {
        let mut f = square(0.0, 0.0, 1.0, code);
        f.set("NOME_UNIDA", name);
        f.set("EON_IDAD_1", eon.0);
        f.set("EON_IDAD_M", eon.1);
        f.set("ERA_MINIMA", era.0);
        f.set("ERA_MAXIMA", era.1);
        f
    }

    fn collection(feats: Vec<Feature>) -> FeatureCollection {
        FeatureCollection::new(feats, Crs::Projected)
    }

    #[test]
    fn appends_all_derived_columns() {
        let c = Classifier::default();
        let fc = collection(vec![raw(
            "NP3alfa_gr",
            "Grupo Teste",
            ("Proterozoico", "Proterozoico"),
            ("", ""),
        )]);
        let out = c.classify(&fc, &ClassifyOptions::default(), None).unwrap();
        let f = &out.features[0];
        assert_eq!(f.get_or_empty(COL_AGE_CODE), "NP3");
        assert_eq!(f.get_or_empty(COL_GREEK), "alfa");
        assert_eq!(f.get_or_empty(COL_COARSE), "NP3|alfa");
        assert_eq!(f.get_or_empty(COL_MACRO_ERA), "Pre-Cambrian");
        assert_eq!(f.get_or_empty(COL_DOMINO_OK), "1");
        assert_eq!(f.get_or_empty("sigla"), "NP3alfa_gr");
    }

    #[test]
    fn missing_required_column_is_named() {
        let c = Classifier::default();
        let mut f = square(0.0, 0.0, 1.0, "NP3");
        f.set("EON_IDAD_1", "");
        f.set("EON_IDAD_M", "");
        f.set("ERA_MINIMA", "");
        // ERA_MAXIMA intentionally absent.
        let fc = collection(vec![f]);
        match c.classify(&fc, &ClassifyOptions::default(), None) {
            Err(CartaError::MissingColumn(col)) => assert_eq!(col, "ERA_MAXIMA"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn mask_mode_clears_inconsistent_groups() {
        let c = Classifier::default();
        // Ranges say Mesozoic, code Q2 says Cenozoic.
        let fc = collection(vec![raw(
            "Q2",
            "x",
            ("Fanerozoico", "Fanerozoico"),
            ("Mesozoico", "Mesozoico"),
        )]);

        let flagged = c.classify(&fc, &ClassifyOptions::default(), None).unwrap();
        assert_eq!(flagged.features[0].get_or_empty(COL_DOMINO_OK), "0");
        assert_eq!(flagged.features[0].coarse_grp(), "Q2");

        let opts = ClassifyOptions { enforce: EnforceMode::Mask, ..Default::default() };
        let masked = c.classify(&fc, &opts, None).unwrap();
        assert_eq!(masked.features[0].coarse_grp(), "");
    }

    #[test]
    fn name_merge_runs_inside_classify() {
        let c = Classifier::default();
        let fc = collection(vec![
            raw("NP3alfa", "Grupo Um", ("Proterozoico", "Proterozoico"), ("", "")),
            raw("NP3alfa", "Grupo Um", ("Proterozoico", "Proterozoico"), ("", "")),
            raw("NP3beta", "Grupo Um", ("Proterozoico", "Proterozoico"), ("", "")),
        ]);
        let out = c.classify(&fc, &ClassifyOptions::default(), None).unwrap();
        for f in &out.features {
            assert_eq!(f.coarse_grp(), "NP3|alfa");
        }
    }

    #[test]
    fn classification_recomputes_groups_wholesale() {
        let c = Classifier::default();
        let fc = collection(vec![raw("K1", "x", ("", ""), ("Mesozoico", "Mesozoico"))]);
        let once = c.classify(&fc, &ClassifyOptions::default(), None).unwrap();
        let twice = c.classify(&once, &ClassifyOptions::default(), None).unwrap();
        assert_eq!(once.groups(), twice.groups());
    }
}
