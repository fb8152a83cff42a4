//! Feature and collection model.
//!
//! Attributes are kept as string columns, mirroring the survey tables the
//! collections come from. Classification appends derived columns; everything
//! else on a feature is immutable.

use std::collections::BTreeMap;

use geo::{BooleanOps, MultiPolygon, Rect};
use serde::{Deserialize, Serialize};

use crate::error::CartaError;

// ── Derived columns appended by classification ────────────────────────────────

pub const COL_AGE_CODE: &str = "age_code";
pub const COL_GREEK: &str = "greek";
pub const COL_STEM: &str = "stem";
pub const COL_COARSE: &str = "coarse_grp";
/// Macro-era implied by the code's leading letters alone.
pub const COL_CODE_ERA: &str = "code_era";
pub const COL_EON_DOMINO: &str = "eon_domino";
pub const COL_MACRO_ERA: &str = "macro_era";
pub const COL_DOMINO_OK: &str = "domino_ok";

/// Coordinate reference system of a collection, reduced to what the frame
/// policy needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crs {
    /// Angular units (degrees), WGS84-like.
    Geographic,
    /// Already projected; linear units are metres.
    Projected,
    /// No usable CRS information.
    Unknown,
}

/// Input column names. Defaults match the Brazilian survey schema the original
/// data ships with; all are overridable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Structured unit-code column.
    pub code: String,
    /// Canonical unit-name column.
    pub name: String,
    /// Hierarchy label column (legend metadata, carried through untouched).
    pub hierarchy: String,
    pub eon_min: String,
    pub eon_max: String,
    pub era_min: String,
    pub era_max: String,
    /// Optional lithology-class column.
    pub lith_class: String,
    /// Optional rock-type column.
    pub rock_type: String,
    /// Lowercase alias column the classifier appends with a copy of the code;
    /// style palettes are matched against it and its `<alias>_*` variants.
    pub code_alias: String,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            code: "SIGLA_UNID".into(),
            name: "NOME_UNIDA".into(),
            hierarchy: "HIERARQUIA".into(),
            eon_min: "EON_IDAD_1".into(),
            eon_max: "EON_IDAD_M".into(),
            era_min: "ERA_MINIMA".into(),
            era_max: "ERA_MAXIMA".into(),
            lith_class: "CLASSE_ROC".into(),
            rock_type: "CLASSE_R_1".into(),
            code_alias: "sigla".into(),
        }
    }
}

/// Axis-aligned clip window, in the layer's own coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl ClipBox {
    pub fn validate(&self) -> Result<(), CartaError> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.max_x <= self.min_x || self.max_y <= self.min_y {
            return Err(CartaError::InvalidClipBox);
        }
        Ok(())
    }
}

/// One map polygon (possibly multi-part) with its attribute row.
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: MultiPolygon<f64>,
    pub attrs: BTreeMap<String, String>,
}

impl Feature {
    pub fn new(geometry: MultiPolygon<f64>) -> Self {
        Self { geometry, attrs: BTreeMap::new() }
    }

    /// Attribute value, `None` when the column is absent.
    pub fn get(&self, col: &str) -> Option<&str> {
        self.attrs.get(col).map(String::as_str)
    }

    /// Attribute value with absent columns read as empty.
    pub fn get_or_empty(&self, col: &str) -> &str {
        self.get(col).unwrap_or("")
    }

    pub fn set(&mut self, col: &str, value: impl Into<String>) {
        self.attrs.insert(col.to_string(), value.into());
    }

    /// Coarse classification group (empty until classified).
    pub fn coarse_grp(&self) -> &str {
        self.get_or_empty(COL_COARSE)
    }

    pub fn macro_era(&self) -> &str {
        self.get_or_empty(COL_MACRO_ERA)
    }

    /// Domino consistency flag; unclassified features read as consistent.
    pub fn domino_ok(&self) -> bool {
        self.get(COL_DOMINO_OK).map(|v| v != "0").unwrap_or(true)
    }

    /// True when the geometry has no rings at all.
    pub fn is_empty(&self) -> bool {
        self.geometry.0.iter().all(|p| p.exterior().0.is_empty())
    }
}

/// An in-memory feature layer; the unit every pipeline stage consumes and
/// produces whole.
#[derive(Debug, Clone)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    pub crs: Crs,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>, crs: Crs) -> Self {
        Self { features, crs }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Fail fast when any feature lacks `col`, naming the missing column.
    pub fn require_column(&self, col: &str) -> Result<(), CartaError> {
        if self.features.iter().any(|f| f.get(col).is_none()) {
            return Err(CartaError::MissingColumn(col.to_string()));
        }
        Ok(())
    }

    /// True when at least one feature carries `col`.
    pub fn has_column(&self, col: &str) -> bool {
        self.features.iter().any(|f| f.get(col).is_some())
    }

    /// Union of attribute keys across all features, sorted.
    pub fn column_names(&self) -> Vec<String> {
        let mut cols: Vec<String> = self
            .features
            .iter()
            .flat_map(|f| f.attrs.keys().cloned())
            .collect();
        cols.sort();
        cols.dedup();
        cols
    }

    /// Distinct nonempty values of `col` over the whole collection, sorted.
    pub fn distinct_values(&self, col: &str) -> Vec<String> {
        let mut vals: Vec<String> = self
            .features
            .iter()
            .filter_map(|f| f.get(col))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        vals.sort();
        vals.dedup();
        vals
    }

    /// Distinct nonempty coarse groups, sorted. This is the group universe —
    /// membership is always recomputed from the column, never cached.
    pub fn groups(&self) -> Vec<String> {
        self.distinct_values(COL_COARSE)
    }

    /// Intersect every feature with `window`, dropping the ones the clip
    /// leaves empty. Attributes carry through untouched. A window that
    /// removes everything is an error, never a silently empty layer.
    pub fn clip(&self, window: &ClipBox) -> Result<FeatureCollection, CartaError> {
        window.validate()?;
        let mask = MultiPolygon(vec![Rect::new(
            (window.min_x, window.min_y),
            (window.max_x, window.max_y),
        )
        .to_polygon()]);

        let mut features = Vec::new();
        for f in &self.features {
            if f.is_empty() {
                continue;
            }
            let clipped = f.geometry.intersection(&mask);
            if clipped.0.is_empty() {
                continue;
            }
            let mut out = f.clone();
            out.geometry = clipped;
            features.push(out);
        }
        if features.is_empty() {
            return Err(CartaError::EmptyClip);
        }
        Ok(FeatureCollection::new(features, self.crs))
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::square;
    use super::*;

    #[test]
    fn require_column_names_the_missing_column() {
        let mut a = square(0.0, 0.0, 1.0, "NP3");
        a.set("NOME_UNIDA", "x");
        let b = square(2.0, 0.0, 1.0, "K1");
        let fc = FeatureCollection::new(vec![a, b], Crs::Projected);
        assert!(fc.require_column("SIGLA_UNID").is_ok());
        match fc.require_column("NOME_UNIDA") {
            Err(CartaError::MissingColumn(c)) => assert_eq!(c, "NOME_UNIDA"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn clip_trims_geometry_and_drops_outside_features() {
        use approx::assert_relative_eq;
        use geo::Area;

        let fc = FeatureCollection::new(
            vec![square(0.0, 0.0, 10.0, "A"), square(50.0, 50.0, 5.0, "B")],
            Crs::Projected,
        );
        let window = ClipBox { min_x: -5.0, min_y: -5.0, max_x: 5.0, max_y: 20.0 };
        let out = fc.clip(&window).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.features[0].get_or_empty("SIGLA_UNID"), "A");
        // The half of A inside the window survives.
        assert_relative_eq!(
            out.features[0].geometry.unsigned_area(),
            50.0,
            max_relative = 1e-9
        );
        assert_eq!(out.crs, Crs::Projected);
    }

    #[test]
    fn clip_that_removes_everything_is_an_error() {
        let fc = FeatureCollection::new(vec![square(0.0, 0.0, 1.0, "A")], Crs::Projected);
        let window = ClipBox { min_x: 10.0, min_y: 10.0, max_x: 20.0, max_y: 20.0 };
        assert!(matches!(fc.clip(&window), Err(CartaError::EmptyClip)));
    }

    #[test]
    fn degenerate_clip_windows_are_rejected() {
        let fc = FeatureCollection::new(vec![square(0.0, 0.0, 1.0, "A")], Crs::Projected);
        let flat = ClipBox { min_x: 5.0, min_y: 0.0, max_x: 5.0, max_y: 1.0 };
        assert!(matches!(fc.clip(&flat), Err(CartaError::InvalidClipBox)));
        let nan = ClipBox { min_x: f64::NAN, min_y: 0.0, max_x: 1.0, max_y: 1.0 };
        assert!(matches!(fc.clip(&nan), Err(CartaError::InvalidClipBox)));
    }

    #[test]
    fn groups_are_distinct_sorted_nonempty() {
        let mut a = square(0.0, 0.0, 1.0, "NP3");
        a.set(COL_COARSE, "NP3|alfa");
        let mut b = square(2.0, 0.0, 1.0, "K1");
        b.set(COL_COARSE, "K");
        let mut c = square(4.0, 0.0, 1.0, "X");
        c.set(COL_COARSE, "");
        let fc = FeatureCollection::new(vec![a, b, c], Crs::Projected);
        assert_eq!(fc.groups(), vec!["K".to_string(), "NP3|alfa".to_string()]);
    }
}
