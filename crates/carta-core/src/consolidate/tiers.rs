//! Assignment tiers for small-polygon absorption.
//!
//! Every tier maps small features onto big targets under the same policy: a
//! target that intersects the small wins over any nearer one that does not;
//! intersection ties break to the biggest target; distance ties (relative
//! tolerance) break to the biggest target. The tiers differ only in how the
//! candidate targets are found, each one catching what the previous could not
//! locate.

use std::collections::BTreeMap;

use geo::{BoundingRect, EuclideanDistance, InteriorPoint, Intersects, MultiPolygon};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};

/// Relative tolerance for treating two candidate distances as equal.
const DISTANCE_REL_EPS: f64 = 1e-5;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= DISTANCE_REL_EPS * a.abs().max(b.abs())
}

/// Minimum distance between two multipolygons; infinite when either is empty.
pub(crate) fn geom_distance(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> f64 {
    let mut best = f64::INFINITY;
    for pa in &a.0 {
        for pb in &b.0 {
            best = best.min(pa.euclidean_distance(pb));
        }
    }
    best
}

/// Pick the best target among candidates: intersecting targets first by area,
/// otherwise nearest by true geometry distance with the area tie-break.
fn pick_target(
    small: &MultiPolygon<f64>,
    candidates: impl Iterator<Item = usize>,
    geoms: &[MultiPolygon<f64>],
    areas: &[f64],
) -> Option<usize> {
    let mut touch: Option<usize> = None;
    let mut nearest: Option<usize> = None;
    let mut nearest_d = f64::INFINITY;
    for t in candidates {
        if small.intersects(&geoms[t]) {
            if touch.map(|b| areas[t] > areas[b]).unwrap_or(true) {
                touch = Some(t);
            }
            continue;
        }
        if touch.is_some() {
            continue;
        }
        let d = geom_distance(small, &geoms[t]);
        if !d.is_finite() {
            continue;
        }
        let better = match nearest {
            None => true,
            Some(b) => {
                (d < nearest_d && !close(d, nearest_d))
                    || (close(d, nearest_d) && areas[t] > areas[b])
            }
        };
        if better {
            nearest_d = d;
            nearest = Some(t);
        }
    }
    touch.or(nearest)
}

fn record(out: &mut BTreeMap<usize, Vec<usize>>, target: usize, small: usize) {
    out.entry(target).or_default().push(small);
}

/// Tier one: k nearest targets by interior point. Returns the small indices
/// it could not place (no interior point on either side).
pub(crate) fn assign_by_interior_points(
    geoms: &[MultiPolygon<f64>],
    areas: &[f64],
    small: &[usize],
    big: &[usize],
    k_neighbors: usize,
    out: &mut BTreeMap<usize, Vec<usize>>,
) -> Vec<usize> {
    let entries: Vec<GeomWithData<[f64; 2], usize>> = big
        .iter()
        .filter_map(|&b| geoms[b].interior_point().map(|p| GeomWithData::new([p.x(), p.y()], b)))
        .collect();
    if entries.is_empty() {
        return small.to_vec();
    }
    let k = k_neighbors.max(1).min(entries.len());
    let tree = RTree::bulk_load(entries);

    let mut leftover = Vec::new();
    for &s in small {
        let Some(p) = geoms[s].interior_point() else {
            leftover.push(s);
            continue;
        };
        let candidates = tree
            .nearest_neighbor_iter(&[p.x(), p.y()])
            .take(k)
            .map(|e| e.data);
        match pick_target(&geoms[s], candidates, geoms, areas) {
            Some(t) => record(out, t, s),
            None => leftover.push(s),
        }
    }
    leftover
}

/// Tier two: envelope overlap on an R-tree of target bounding boxes, then
/// nearest envelopes checked by true distance.
pub(crate) fn assign_by_envelopes(
    geoms: &[MultiPolygon<f64>],
    areas: &[f64],
    small: &[usize],
    big: &[usize],
    k_neighbors: usize,
    out: &mut BTreeMap<usize, Vec<usize>>,
) -> Vec<usize> {
    let entries: Vec<GeomWithData<Rectangle<[f64; 2]>, usize>> = big
        .iter()
        .filter_map(|&b| {
            geoms[b].bounding_rect().map(|r| {
                let rect =
                    Rectangle::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y]);
                GeomWithData::new(rect, b)
            })
        })
        .collect();
    if entries.is_empty() {
        return small.to_vec();
    }
    let k = k_neighbors.max(1).min(entries.len());
    let tree = RTree::bulk_load(entries);

    let mut leftover = Vec::new();
    for &s in small {
        let Some(r) = geoms[s].bounding_rect() else {
            leftover.push(s);
            continue;
        };
        let env = AABB::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y]);
        let overlapping = tree
            .locate_in_envelope_intersecting(&env)
            .map(|e| e.data)
            .collect::<Vec<_>>();
        let picked = pick_target(&geoms[s], overlapping.into_iter(), geoms, areas).or_else(|| {
            let center = [(r.min().x + r.max().x) / 2.0, (r.min().y + r.max().y) / 2.0];
            let near = tree.nearest_neighbor_iter(&center).take(k).map(|e| e.data);
            pick_target(&geoms[s], near, geoms, areas)
        });
        match picked {
            Some(t) => record(out, t, s),
            None => leftover.push(s),
        }
    }
    leftover
}

/// Tier three: exhaustive scan over every target.
pub(crate) fn assign_exhaustive(
    geoms: &[MultiPolygon<f64>],
    areas: &[f64],
    small: &[usize],
    big: &[usize],
    out: &mut BTreeMap<usize, Vec<usize>>,
) -> Vec<usize> {
    let mut leftover = Vec::new();
    for &s in small {
        match pick_target(&geoms[s], big.iter().copied(), geoms, areas) {
            Some(t) => record(out, t, s),
            None => leftover.push(s),
        }
    }
    leftover
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn sq(x: f64, y: f64, s: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y),
            (x: x + s, y: y),
            (x: x + s, y: y + s),
            (x: x, y: y + s),
            (x: x, y: y),
        ]])
    }

    #[test]
    fn intersecting_target_beats_a_nearer_disjoint_one() {
        // Small overlaps the far-centered big A and sits 5 m from big B.
        let geoms = vec![sq(0.0, 0.0, 100.0), sq(115.0, 0.0, 100.0), sq(98.0, 40.0, 10.0)];
        let areas = vec![10_000.0, 10_000.0, 100.0];
        let mut out = BTreeMap::new();
        let left =
            assign_by_interior_points(&geoms, &areas, &[2], &[0, 1], 8, &mut out);
        assert!(left.is_empty());
        assert_eq!(out.get(&0), Some(&vec![2]));
    }

    #[test]
    fn distance_ties_break_to_the_larger_target() {
        // Small is exactly 50 m from both bigs; B is larger.
        let geoms = vec![sq(0.0, 0.0, 100.0), sq(210.0, 0.0, 200.0), sq(150.0, 40.0, 10.0)];
        let areas = vec![10_000.0, 40_000.0, 100.0];
        let mut out = BTreeMap::new();
        let left = assign_exhaustive(&geoms, &areas, &[2], &[0, 1], &mut out);
        assert!(left.is_empty());
        assert_eq!(out.get(&1), Some(&vec![2]));
    }

    #[test]
    fn empty_geometry_is_left_over_by_every_tier() {
        let geoms = vec![sq(0.0, 0.0, 100.0), MultiPolygon(vec![])];
        let areas = vec![10_000.0, 0.0];
        let mut out = BTreeMap::new();
        assert_eq!(
            assign_by_interior_points(&geoms, &areas, &[1], &[0], 8, &mut out),
            vec![1],
        );
        assert_eq!(assign_by_envelopes(&geoms, &areas, &[1], &[0], 8, &mut out), vec![1]);
        assert_eq!(assign_exhaustive(&geoms, &areas, &[1], &[0], &mut out), vec![1]);
        assert!(out.is_empty());
    }

    #[test]
    fn envelope_tier_places_disjoint_smalls_too() {
        let geoms = vec![sq(0.0, 0.0, 100.0), sq(300.0, 300.0, 5.0)];
        let areas = vec![10_000.0, 25.0];
        let mut out = BTreeMap::new();
        let left = assign_by_envelopes(&geoms, &areas, &[1], &[0], 8, &mut out);
        assert!(left.is_empty());
        assert_eq!(out.get(&0), Some(&vec![1]));
    }
}
