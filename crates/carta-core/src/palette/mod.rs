//! Per-group color resolution.
//!
//! Every coarse group collects up to four candidate color sources (style
//! palettes, age table, lithology-class mix, rock-type mix), a preliminary
//! color is chosen by fixed priority, and duplicate colors across groups are
//! reduced by three ordered passes: blend in the lithology mix, blend in the
//! rock-type mix, then a small deterministic hue/lightness jitter. Resolution
//! is total — a group with no source at all gets the default gray.

pub mod age_table;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::color::{jitter, mix_two, mix_weighted, Rgb};
use crate::feature::{FeatureCollection, FieldConfig, COL_COARSE};
use crate::frame::{area_weights, FrameMeta, FrameStrategy, Projection};
use crate::text::norm_key;
use age_table::{AgeMap, AgeTable};

/// Default fallback gray for groups with no color source at all.
pub const DEFAULT_GRAY: Rgb = Rgb::new(0xDD, 0xDD, 0xDD);

/// Jitter tuning for the final collision pass.
const JITTER_HUE: f64 = 0.05;
const JITTER_LIGHT_FIRST: f64 = 0.02;
const JITTER_LIGHT_LATER: f64 = 0.015;
const JITTER_ROUNDS: usize = 3;

// ── Style palettes ────────────────────────────────────────────────────────────

/// One externally supplied categorized palette (e.g. parsed from a style
/// document by a collaborator) keyed by an attribute column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Palette {
    /// Attribute the palette was authored against, when known.
    pub attr: Option<String>,
    pub colors: BTreeMap<String, Rgb>,
}

impl Palette {
    /// Parse the JSON form style-document collaborators hand over:
    /// `{"attr": "sigla", "colors": {"NP3aa": "#CD5C5C", ...}}`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// All loaded style palettes plus the merged value→color map they feed.
#[derive(Debug, Clone, Default)]
pub struct StylePalettes {
    palettes: Vec<Palette>,
    merged: BTreeMap<String, Rgb>,
}

impl StylePalettes {
    pub fn add(&mut self, palette: Palette) {
        for (value, color) in &palette.colors {
            self.merged.insert(value.clone(), *color);
            self.merged.insert(value.to_uppercase(), *color);
            self.merged.insert(value.to_lowercase(), *color);
        }
        self.palettes.push(palette);
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    pub fn palettes(&self) -> &[Palette] {
        &self.palettes
    }

    /// Exact key first, then uppercase, then lowercase.
    pub fn lookup(&self, value: &str) -> Option<Rgb> {
        self.merged
            .get(value)
            .or_else(|| self.merged.get(&value.to_uppercase()))
            .or_else(|| self.merged.get(&value.to_lowercase()))
            .copied()
    }
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Color sources and weighting policy.
pub struct PaletteConfig {
    pub age_map: AgeMap,
    /// Lithology-class text → color; keys are matched accent/case-folded.
    pub lith_class_colors: BTreeMap<String, Rgb>,
    /// Rock-type text → color; keys are matched accent/case-folded.
    pub rock_type_colors: BTreeMap<String, Rgb>,
    pub style: StylePalettes,
    /// Candidate attribute columns for the style mix; empty = auto-detect
    /// columns named after the code alias.
    pub style_attr_candidates: Vec<String>,
    /// Weight mixes by ground area (else every feature weighs 1.0).
    pub area_weighting: bool,
    pub default_color: Rgb,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        let hex = |s: &str| Rgb::from_hex(s).expect("static table color");
        let lith = [
            ("Material superficial", "#CCCC99"),
            ("Sedimentar", "#FFCC66"),
            ("Metamórfica", "#CC99FF"),
            ("Ígnea", "#9999FF"),
            ("Ígnea, Metamórfica", "#9966CC"),
            ("Metamórfica, Ígnea", "#9966CC"),
            ("Sedimentar, Ígnea", "#FF9966"),
            ("Ígnea, Sedimentar", "#FF9966"),
            ("Sedimentar (ou Sedimentos)", "#FFCC66"),
            ("Ígnea, Sedimentar (ou Sedimentos)", "#FF9966"),
        ];
        let rock = [
            ("intrusiva", "#8FA1FF"),
            ("extrusiva", "#A9B8FF"),
            ("clástica", "#FFDD99"),
            ("química", "#FFE8B3"),
            ("regional", "#BFA1FF"),
            ("contato", "#D5B8FF"),
        ];
        Self {
            age_map: age_table::default_age_map(),
            lith_class_colors: lith.iter().map(|(k, v)| (k.to_string(), hex(v))).collect(),
            rock_type_colors: rock.iter().map(|(k, v)| (k.to_string(), hex(v))).collect(),
            style: StylePalettes::default(),
            style_attr_candidates: Vec::new(),
            area_weighting: true,
            default_color: DEFAULT_GRAY,
        }
    }
}

// ── Audit structures ──────────────────────────────────────────────────────────

/// One attribute value's contribution to a weighted mix.
#[derive(Debug, Clone, Serialize)]
pub struct MixItem {
    pub value: String,
    pub area: f64,
    pub weight: f64,
    pub color: Option<Rgb>,
}

/// A weighted-average mix over one attribute column.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeightedMix {
    pub items: Vec<MixItem>,
    pub mix: Option<Rgb>,
    pub total_area: f64,
}

/// Everything recorded for one group during resolution.
#[derive(Debug, Clone, Serialize)]
pub struct GroupAudit {
    pub age_code: String,
    pub age_color: Option<Rgb>,
    pub style_attr: Option<String>,
    pub style: WeightedMix,
    pub lith_class: WeightedMix,
    pub rock_type: WeightedMix,
    pub preliminary: Rgb,
    pub after_pass_a: Rgb,
    pub after_pass_b: Rgb,
    pub final_color: Rgb,
}

/// Full audit trail of one resolution run.
#[derive(Debug, Clone, Serialize)]
pub struct ColorAudit {
    pub frame: FrameMeta,
    pub groups: BTreeMap<String, GroupAudit>,
}

// ── Resolver ──────────────────────────────────────────────────────────────────

/// Working state per group while the passes run.
struct GroupState {
    resolved: Rgb,
    age_color: Option<Rgb>,
    lith_mix: Option<Rgb>,
    rock_mix: Option<Rgb>,
}

pub struct ColorResolver {
    config: PaletteConfig,
    fields: FieldConfig,
    age_table: AgeTable,
}

impl ColorResolver {
    pub fn new(config: PaletteConfig, fields: FieldConfig) -> Self {
        let age_table = AgeTable::from_map(&config.age_map);
        Self { config, fields, age_table }
    }

    /// Resolve colors for every coarse group of a classified collection.
    ///
    /// Never fails: groups without any source resolve to the default gray,
    /// and weighting falls back to equal weights without a metric frame.
    pub fn resolve(
        &self,
        fc: &FeatureCollection,
        area_frame: Option<Arc<dyn Projection>>,
    ) -> (BTreeMap<String, Rgb>, ColorAudit) {
        let (weights, frame_meta) = if self.config.area_weighting {
            area_weights(fc, area_frame)
        } else {
            (
                vec![1.0; fc.len()],
                FrameMeta { strategy: FrameStrategy::EqualWeights, frame_id: "none".into() },
            )
        };

        let lith_lut: BTreeMap<String, Rgb> = self
            .config
            .lith_class_colors
            .iter()
            .map(|(k, v)| (norm_key(k), *v))
            .collect();
        let rock_lut: BTreeMap<String, Rgb> = self
            .config
            .rock_type_colors
            .iter()
            .map(|(k, v)| (norm_key(k), *v))
            .collect();

        let groups = fc.groups();
        let mut state: BTreeMap<String, GroupState> = BTreeMap::new();
        let mut audit = ColorAudit { frame: frame_meta, groups: BTreeMap::new() };

        for grp in &groups {
            let age_code = age_code_of_group(grp);
            let age_color = self.age_table.lookup(&age_code);

            let (style_attr, style_pack) = self.best_style_mix(fc, &weights, grp);
            let lith_pack = self.weighted_pack(fc, &weights, grp, &self.fields.lith_class, |v| {
                lith_lut.get(&norm_key(v)).copied()
            });
            let rock_pack = self.weighted_pack(fc, &weights, grp, &self.fields.rock_type, |v| {
                rock_lut.get(&norm_key(v)).copied()
            });

            let preliminary = if let Some(mix) = style_pack.mix {
                mix
            } else if let Some(color) = self.single_lith_color(fc, grp, &lith_lut) {
                color
            } else {
                age_color.unwrap_or(self.config.default_color)
            };

            audit.groups.insert(
                grp.clone(),
                GroupAudit {
                    age_code,
                    age_color,
                    style_attr: style_attr.clone(),
                    style: style_pack.clone(),
                    lith_class: lith_pack.clone(),
                    rock_type: rock_pack.clone(),
                    preliminary,
                    after_pass_a: preliminary,
                    after_pass_b: preliminary,
                    final_color: preliminary,
                },
            );
            state.insert(
                grp.clone(),
                GroupState {
                    resolved: preliminary,
                    age_color,
                    lith_mix: lith_pack.mix,
                    rock_mix: rock_pack.mix,
                },
            );
        }

        // Pass A: blend the lithology mix into colliding groups.
        for set in duplicate_sets(&state) {
            for grp in set {
                let Some(s) = state.get_mut(&grp) else { continue };
                if let Some(lith) = s.lith_mix {
                    let base = s.age_color.or(Some(lith));
                    s.resolved = mix_two(base, Some(lith), 0.5).unwrap_or(s.resolved);
                }
            }
        }
        for (grp, s) in &state {
            if let Some(a) = audit.groups.get_mut(grp) {
                a.after_pass_a = s.resolved;
                a.after_pass_b = s.resolved;
                a.final_color = s.resolved;
            }
        }

        // Pass B: blend the rock-type mix into groups still colliding.
        for set in duplicate_sets(&state) {
            for grp in set {
                let Some(s) = state.get_mut(&grp) else { continue };
                let base = if s.lith_mix.is_some() {
                    mix_two(s.age_color, s.lith_mix, 0.5)
                } else {
                    s.age_color.or(s.rock_mix).or(Some(self.config.default_color))
                };
                s.resolved = if s.rock_mix.is_some() {
                    mix_two(base, s.rock_mix, 0.5).unwrap_or(s.resolved)
                } else {
                    base.unwrap_or(s.resolved)
                };
            }
        }
        for (grp, s) in &state {
            if let Some(a) = audit.groups.get_mut(grp) {
                a.after_pass_b = s.resolved;
                a.final_color = s.resolved;
            }
        }

        // Pass C: deterministic jitter, rank-keyed within each collision set.
        for round in 0..JITTER_ROUNDS {
            let dups = duplicate_sets(&state);
            if dups.is_empty() {
                break;
            }
            let dl = if round == 0 { JITTER_LIGHT_FIRST } else { JITTER_LIGHT_LATER };
            for set in dups {
                for (i, grp) in set.iter().enumerate() {
                    let Some(s) = state.get_mut(grp) else { continue };
                    s.resolved = jitter(s.resolved, i, JITTER_HUE, dl);
                }
            }
        }
        for (grp, s) in &state {
            if let Some(a) = audit.groups.get_mut(grp) {
                a.final_color = s.resolved;
            }
        }

        let map = state.into_iter().map(|(g, s)| (g, s.resolved)).collect();
        (map, audit)
    }

    /// Candidate style columns in priority order.
    fn style_candidates(&self, fc: &FeatureCollection) -> Vec<String> {
        if !self.config.style_attr_candidates.is_empty() {
            return self
                .config
                .style_attr_candidates
                .iter()
                .filter(|c| fc.has_column(c))
                .cloned()
                .collect();
        }
        let alias = self.fields.code_alias.to_lowercase();
        let prefix = format!("{alias}_");
        let mut cols: Vec<String> = fc
            .column_names()
            .into_iter()
            .filter(|c| {
                let l = c.to_lowercase();
                l == alias || l.starts_with(&prefix)
            })
            .collect();
        // Exact alias sorts ahead of its variants.
        cols.sort_by_key(|c| (c.to_lowercase() != alias, c.clone()));
        cols
    }

    /// Choose the candidate column whose mix covers the most area.
    fn best_style_mix(
        &self,
        fc: &FeatureCollection,
        weights: &[f64],
        grp: &str,
    ) -> (Option<String>, WeightedMix) {
        if self.config.style.is_empty() {
            return (None, WeightedMix::default());
        }
        let mut best: Option<(String, WeightedMix)> = None;
        let mut best_area = 0.0f64;
        for col in self.style_candidates(fc) {
            let pack =
                self.weighted_pack(fc, weights, grp, &col, |v| self.config.style.lookup(v));
            if pack.mix.is_some() && pack.total_area > best_area {
                best_area = pack.total_area;
                best = Some((col, pack));
            }
        }
        match best {
            Some((attr, pack)) => (Some(attr), pack),
            None => (None, WeightedMix::default()),
        }
    }

    /// Area-per-value aggregation and weighted mix for one column of a group.
    fn weighted_pack(
        &self,
        fc: &FeatureCollection,
        weights: &[f64],
        grp: &str,
        col: &str,
        lookup: impl Fn(&str) -> Option<Rgb>,
    ) -> WeightedMix {
        let mut area_by_value: BTreeMap<String, f64> = BTreeMap::new();
        for (i, f) in fc.features.iter().enumerate() {
            if f.get_or_empty(COL_COARSE) != grp {
                continue;
            }
            let Some(value) = f.get(col) else { continue };
            *area_by_value.entry(value.to_string()).or_insert(0.0) += weights[i];
        }

        let total: f64 = area_by_value.values().filter(|a| **a > 0.0).sum();
        let mut pack = WeightedMix { items: Vec::new(), mix: None, total_area: total };
        let mut pairs: Vec<(Rgb, f64)> = Vec::new();
        for (value, area) in area_by_value {
            if area <= 0.0 {
                continue;
            }
            let color = lookup(&value);
            pack.items.push(MixItem {
                value,
                area,
                weight: if total > 0.0 { area / total } else { 0.0 },
                color,
            });
            if let Some(c) = color {
                pairs.push((c, area));
            }
        }
        pack.mix = mix_weighted(&pairs);
        pack
    }

    /// The lithology-class color when the group has exactly one distinct
    /// nonempty class and the table knows it.
    fn single_lith_color(
        &self,
        fc: &FeatureCollection,
        grp: &str,
        lith_lut: &BTreeMap<String, Rgb>,
    ) -> Option<Rgb> {
        let mut values: Vec<&str> = fc
            .features
            .iter()
            .filter(|f| f.get_or_empty(COL_COARSE) == grp)
            .filter_map(|f| f.get(&self.fields.lith_class))
            .filter(|v| !v.is_empty())
            .collect();
        values.sort();
        values.dedup();
        match values.as_slice() {
            [only] => lith_lut.get(&norm_key(only)).copied(),
            _ => None,
        }
    }
}

/// Age code embedded in a group key: leading `[A-Z0-9_]` run of the part
/// before the `|`, uppercased (the whole part when it has no such prefix).
fn age_code_of_group(grp: &str) -> String {
    let head = grp.split('|').next().unwrap_or("");
    let end = head
        .find(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'))
        .unwrap_or(head.len());
    let s = if end > 0 { &head[..end] } else { head };
    s.to_ascii_uppercase()
}

/// Sets of ≥2 groups currently sharing an identical resolved color.
/// Group order within a set is alphabetical, which keys the jitter ranks.
fn duplicate_sets(state: &BTreeMap<String, GroupState>) -> Vec<Vec<String>> {
    let mut by_color: BTreeMap<Rgb, Vec<String>> = BTreeMap::new();
    for (grp, s) in state {
        by_color.entry(s.resolved).or_default().push(grp.clone());
    }
    by_color.into_values().filter(|v| v.len() > 1).collect()
}
