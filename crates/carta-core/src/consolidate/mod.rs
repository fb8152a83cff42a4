//! Scale-driven spatial consolidation.
//!
//! Polygons too small to be visible at the output scale are absorbed into a
//! neighboring large polygon. The visibility threshold comes straight from the
//! scale denominator: a feature under `min_area_mm2` of printed area is small.
//! Assignment runs through the tiers in [`tiers`], each consuming what the
//! previous one could not place; smalls that no tier can place are reported,
//! never silently dropped. Requires a metric frame — geometry is projected
//! once, unioned there, and unprojected on the way out.

mod tiers;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, MultiPolygon};
use serde::Serialize;

use crate::error::CartaError;
use crate::feature::FeatureCollection;
use crate::frame::{FrameMeta, MetricFrame, Projection};
use crate::scale::{compute_scale, ScaleConfig};

/// Consolidation policy.
#[derive(Debug, Clone)]
pub struct ConsolidateConfig {
    /// Figure geometry the visibility threshold is derived from.
    pub scale: ScaleConfig,
    /// Printed-area visibility threshold in mm² on the figure.
    pub min_area_mm2: f64,
    /// Candidate targets examined per small feature in the indexed tiers.
    pub k_neighbors: usize,
    /// Drop empty parts and re-orient rings after each union.
    pub repair: bool,
}

impl ConsolidateConfig {
    /// Reject thresholds that can never select a small feature, and anything
    /// the figure settings themselves rule out.
    pub fn validate(&self) -> Result<(), CartaError> {
        if !(self.min_area_mm2 > 0.0) {
            return Err(CartaError::InvalidMinArea(self.min_area_mm2));
        }
        self.scale.validate()
    }
}

impl Default for ConsolidateConfig {
    fn default() -> Self {
        Self {
            scale: ScaleConfig::default(),
            min_area_mm2: 1.0,
            k_neighbors: 8,
            repair: true,
        }
    }
}

/// Who absorbed whom, plus everything needed to audit the run.
/// Indices refer to feature positions in the input collection.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationPlan {
    pub denominator: u64,
    pub threshold_m2: f64,
    pub small_count: usize,
    /// Target index → absorbed small indices.
    pub assignments: BTreeMap<usize, Vec<usize>>,
    /// Smalls no tier could place; their features are kept as-is.
    pub unresolved: Vec<usize>,
    pub frame: FrameMeta,
}

/// Consolidate a collection for its output scale.
pub fn consolidate(
    fc: &FeatureCollection,
    config: &ConsolidateConfig,
    user: Option<Arc<dyn Projection>>,
) -> Result<(FeatureCollection, ConsolidationPlan), CartaError> {
    config.validate()?;
    if fc.is_empty() {
        return Err(CartaError::EmptyCollection);
    }

    let scale = compute_scale(fc, &config.scale, user.clone())?;
    let threshold_m2 = (scale.denominator as f64 * 1e-3).powi(2) * config.min_area_mm2;

    let frame = MetricFrame::select(fc, user)?;
    let geoms: Vec<MultiPolygon<f64>> =
        fc.features.iter().map(|f| frame.project(&f.geometry)).collect();
    let areas: Vec<f64> = geoms.iter().map(|g| g.unsigned_area()).collect();

    let small: Vec<usize> =
        (0..fc.len()).filter(|&i| areas[i] < threshold_m2).collect();
    let big: Vec<usize> = (0..fc.len()).filter(|&i| areas[i] >= threshold_m2).collect();

    let mut plan = ConsolidationPlan {
        denominator: scale.denominator,
        threshold_m2,
        small_count: small.len(),
        assignments: BTreeMap::new(),
        unresolved: Vec::new(),
        frame: frame.meta().clone(),
    };
    if small.is_empty() {
        return Ok((fc.clone(), plan));
    }

    if big.is_empty() {
        // Everything is below the threshold: fold the layer into its single
        // largest feature.
        let target = (0..fc.len())
            .max_by(|&a, &b| areas[a].total_cmp(&areas[b]))
            .unwrap_or(0);
        let absorbed: Vec<usize> = (0..fc.len()).filter(|&i| i != target).collect();
        if !absorbed.is_empty() {
            plan.assignments.insert(target, absorbed);
        }
    } else {
        let mut leftover = tiers::assign_by_interior_points(
            &geoms,
            &areas,
            &small,
            &big,
            config.k_neighbors,
            &mut plan.assignments,
        );
        if !leftover.is_empty() {
            log::debug!(
                "interior-point tier left {} of {} small features unplaced",
                leftover.len(),
                small.len(),
            );
            leftover = tiers::assign_by_envelopes(
                &geoms,
                &areas,
                &leftover,
                &big,
                config.k_neighbors,
                &mut plan.assignments,
            );
        }
        if !leftover.is_empty() {
            leftover =
                tiers::assign_exhaustive(&geoms, &areas, &leftover, &big, &mut plan.assignments);
        }
        if !leftover.is_empty() {
            log::debug!("{} small features could not be placed", leftover.len());
        }
        plan.unresolved = leftover;
    }

    Ok((apply(fc, &frame, &geoms, &plan, config.repair), plan))
}

/// Union each target with its absorbed smalls and drop the absorbed features.
/// Untouched features keep their native geometry verbatim.
fn apply(
    fc: &FeatureCollection,
    frame: &MetricFrame,
    geoms: &[MultiPolygon<f64>],
    plan: &ConsolidationPlan,
    repair: bool,
) -> FeatureCollection {
    let absorbed: BTreeSet<usize> =
        plan.assignments.values().flatten().copied().collect();

    let mut out = fc.clone();
    for (&target, smalls) in &plan.assignments {
        let mut merged = geoms[target].clone();
        for &s in smalls {
            if geoms[s].0.is_empty() {
                continue;
            }
            merged = merged.union(&geoms[s]);
        }
        if repair {
            merged.0.retain(|p| !p.exterior().0.is_empty() && p.unsigned_area() > 0.0);
            merged = merged.orient(Direction::Default);
        }
        out.features[target].geometry = frame.unproject(&merged);
    }

    let mut i = 0;
    out.features.retain(|_| {
        let keep = !absorbed.contains(&i);
        i += 1;
        keep
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_util::square;
    use crate::feature::{Crs, Feature};
    use crate::scale::{RoundMode, Unit};
    use approx::assert_relative_eq;
    use geo::Area;

    fn config() -> ConsolidateConfig {
        // 100 mm content width, exact denominator: a 1 km extent gives
        // N = 10 000 and a 100 m² visibility threshold.
        ConsolidateConfig {
            scale: ScaleConfig { fig_width: 100.0, round: None, ..Default::default() },
            ..Default::default()
        }
    }

    fn total_area(fc: &FeatureCollection) -> f64 {
        fc.features.iter().map(|f| f.geometry.unsigned_area()).sum()
    }

    #[test]
    fn threshold_follows_the_scale_denominator() {
        let fc = FeatureCollection::new(
            vec![square(0.0, 0.0, 800.0, "A"), square(800.0, 0.0, 200.0, "B")],
            Crs::Projected,
        );
        let (_, plan) = consolidate(&fc, &config(), None).unwrap();
        assert_eq!(plan.denominator, 10_000);
        assert_relative_eq!(plan.threshold_m2, 100.0, epsilon = 1e-9);
        assert_eq!(plan.small_count, 0);
    }

    #[test]
    fn disjoint_small_is_absorbed_with_area_conserved() {
        let fc = FeatureCollection::new(
            vec![
                square(0.0, 0.0, 800.0, "A"),
                square(996.0, 500.0, 4.0, "B"),
            ],
            Crs::Projected,
        );
        let before = total_area(&fc);
        let (out, plan) = consolidate(&fc, &config(), None).unwrap();
        assert_eq!(plan.assignments.get(&0), Some(&vec![1]));
        assert!(plan.unresolved.is_empty());
        assert_eq!(out.len(), 1);
        assert_eq!(out.features[0].get_or_empty("SIGLA_UNID"), "A");
        assert_relative_eq!(total_area(&out), before, max_relative = 1e-9);
    }

    #[test]
    fn intersecting_target_wins_over_a_nearer_one() {
        // Small overlaps A by 2 m yet sits only 6 m from B.
        let fc = FeatureCollection::new(
            vec![
                square(0.0, 0.0, 700.0, "A"),
                square(712.0, 0.0, 288.0, "B"),
                square(698.0, 100.0, 8.0, "S"),
            ],
            Crs::Projected,
        );
        let (out, plan) = consolidate(&fc, &config(), None).unwrap();
        assert_eq!(plan.assignments.get(&0), Some(&vec![2]));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn all_small_layers_fold_into_the_largest_feature() {
        // Extent 1 km but every square is tiny.
        let fc = FeatureCollection::new(
            vec![
                square(0.0, 0.0, 5.0, "A"),
                square(500.0, 0.0, 9.0, "B"),
                square(991.0, 0.0, 9.0, "C"),
            ],
            Crs::Projected,
        );
        let before = total_area(&fc);
        let (out, plan) = consolidate(&fc, &config(), None).unwrap();
        assert_eq!(out.len(), 1);
        // B and C tie on area; the fold target is simply the first maximum.
        assert!(plan.assignments.len() == 1);
        assert_relative_eq!(total_area(&out), before, max_relative = 1e-9);
    }

    #[test]
    fn consolidation_is_idempotent() {
        let fc = FeatureCollection::new(
            vec![square(0.0, 0.0, 800.0, "A"), square(996.0, 500.0, 4.0, "B")],
            Crs::Projected,
        );
        let cfg = config();
        let (once, _) = consolidate(&fc, &cfg, None).unwrap();
        let (twice, plan) = consolidate(&once, &cfg, None).unwrap();
        assert_eq!(plan.small_count, 0);
        assert_eq!(twice.len(), once.len());
        assert_relative_eq!(total_area(&twice), total_area(&once), max_relative = 1e-9);
    }

    #[test]
    fn unplaceable_smalls_are_reported_and_kept() {
        let mut empty = Feature::new(MultiPolygon(vec![]));
        empty.set("SIGLA_UNID", "E");
        let fc = FeatureCollection::new(
            vec![square(0.0, 0.0, 1_000.0, "A"), empty],
            Crs::Projected,
        );
        let (out, plan) = consolidate(&fc, &config(), None).unwrap();
        assert_eq!(plan.unresolved, vec![1]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn config_validation_rejects_bad_settings_up_front() {
        assert!(ConsolidateConfig::default().validate().is_ok());
        let negative = ConsolidateConfig { min_area_mm2: -1.0, ..Default::default() };
        assert!(matches!(
            negative.validate(),
            Err(CartaError::InvalidMinArea(v)) if v == -1.0
        ));
        let nan = ConsolidateConfig { min_area_mm2: f64::NAN, ..Default::default() };
        assert!(matches!(nan.validate(), Err(CartaError::InvalidMinArea(_))));
        // Figure problems surface through the nested scale config.
        let px = ConsolidateConfig {
            scale: ScaleConfig { width_unit: Unit::Px, dpi: None, ..Default::default() },
            ..Default::default()
        };
        assert!(matches!(px.validate(), Err(CartaError::PixelUnitNeedsDpi)));
    }

    #[test]
    fn invalid_threshold_and_missing_frame_fail_eagerly() {
        let fc = FeatureCollection::new(vec![square(0.0, 0.0, 100.0, "A")], Crs::Projected);
        let bad = ConsolidateConfig { min_area_mm2: 0.0, ..config() };
        assert!(matches!(
            consolidate(&fc, &bad, None),
            Err(CartaError::InvalidMinArea(_))
        ));

        let unknown = FeatureCollection::new(vec![square(0.0, 0.0, 100.0, "A")], Crs::Unknown);
        assert!(matches!(
            consolidate(&unknown, &config(), None),
            Err(CartaError::NoMetricFrame)
        ));
    }

    #[test]
    fn rounded_scales_feed_the_threshold() {
        // Ceil rounding bumps N from 10 000 to itself (already nice); with a
        // 168.75 km extent it lands on 2 000 000 and a 4 km² threshold.
        let fc = FeatureCollection::new(
            vec![square(0.0, 0.0, 168_750.0, "A")],
            Crs::Projected,
        );
        let cfg = ConsolidateConfig {
            scale: ScaleConfig {
                fig_width: 100.0,
                round: Some(RoundMode::Ceil),
                ..Default::default()
            },
            ..Default::default()
        };
        let (_, plan) = consolidate(&fc, &cfg, None).unwrap();
        assert_eq!(plan.denominator, 2_000_000);
        assert_relative_eq!(plan.threshold_m2, 4_000_000.0, epsilon = 1e-6);
    }
}
