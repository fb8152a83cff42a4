//! Reference-frame policy and ground measurement.
//!
//! Area- and width-based stages need geometry in a metric frame. The selection
//! chain is fixed: a caller-supplied equal-area projection wins; otherwise a
//! natively projected collection is used directly; otherwise a spherical
//! Lambert azimuthal equal-area frame is built on the data centroid. A
//! collection with no usable CRS cannot be measured metrically — callers that
//! can tolerate it (color weighting) fall back to equal weights, the rest
//! fail with `NoMetricFrame`.
//!
//! The LAEA math is the standard spherical form on the mean Earth radius;
//! all coordinate math in f64.

use std::fmt;
use std::sync::Arc;

use geo::{Area, BoundingRect, Centroid, Coord, MapCoords, MultiPolygon};
use serde::Serialize;

use crate::error::CartaError;
use crate::feature::{Crs, FeatureCollection};

/// Mean Earth radius in metres (authalic sphere).
pub const EARTH_RADIUS_M: f64 = 6_371_007.181;

/// Fixed degree↔metre approximation: 1″ ≈ 30 m, so 1° ≈ 108 000 m.
/// Ignores variation with latitude; only used via the explicit opt-out.
pub const METERS_PER_DEGREE: f64 = 108_000.0;

/// A caller-supplied planar projection, assumed equal-area.
pub trait Projection {
    fn forward(&self, c: Coord<f64>) -> Coord<f64>;
    fn inverse(&self, c: Coord<f64>) -> Coord<f64>;
    /// Short identifier recorded in metadata and audits.
    fn id(&self) -> String;
}

/// Spherical Lambert azimuthal equal-area projection centered on (lon0, lat0).
#[derive(Debug, Clone, Copy)]
pub struct Laea {
    pub lon0: f64,
    pub lat0: f64,
}

impl Laea {
    pub fn new(lon0: f64, lat0: f64) -> Self {
        Self { lon0, lat0 }
    }
}

impl Projection for Laea {
    fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        let (lam0, phi0) = (self.lon0.to_radians(), self.lat0.to_radians());
        let (lam, phi) = (c.x.to_radians(), c.y.to_radians());
        let dl = lam - lam0;
        let denom = 1.0 + phi0.sin() * phi.sin() + phi0.cos() * phi.cos() * dl.cos();
        // Antipode of the center; map it to the rim rather than dividing by 0.
        if denom <= f64::EPSILON {
            return Coord { x: 2.0 * EARTH_RADIUS_M, y: 0.0 };
        }
        let k = (2.0 / denom).sqrt();
        Coord {
            x: EARTH_RADIUS_M * k * phi.cos() * dl.sin(),
            y: EARTH_RADIUS_M * k * (phi0.cos() * phi.sin() - phi0.sin() * phi.cos() * dl.cos()),
        }
    }

    fn inverse(&self, c: Coord<f64>) -> Coord<f64> {
        let (lam0, phi0) = (self.lon0.to_radians(), self.lat0.to_radians());
        let rho = (c.x * c.x + c.y * c.y).sqrt();
        if rho <= f64::EPSILON {
            return Coord { x: self.lon0, y: self.lat0 };
        }
        let cc = 2.0 * (rho / (2.0 * EARTH_RADIUS_M)).clamp(-1.0, 1.0).asin();
        let phi = (cc.cos() * phi0.sin() + c.y * cc.sin() * phi0.cos() / rho)
            .clamp(-1.0, 1.0)
            .asin();
        let lam = lam0
            + (c.x * cc.sin()).atan2(rho * phi0.cos() * cc.cos() - c.y * phi0.sin() * cc.sin());
        Coord { x: lam.to_degrees(), y: phi.to_degrees() }
    }

    fn id(&self) -> String {
        format!("laea(lon0={:.6}, lat0={:.6})", self.lon0, self.lat0)
    }
}

/// How the metric frame was (or was not) established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStrategy {
    UserEqualArea,
    ProjectedNative,
    AutoLaea,
    /// Fixed degree↔metre constant; widths only, never areas.
    GeographicConstant,
    /// No metric frame; every feature weighs 1.0.
    EqualWeights,
}

impl fmt::Display for FrameStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FrameStrategy::UserEqualArea => "user_equal_area",
            FrameStrategy::ProjectedNative => "projected_native",
            FrameStrategy::AutoLaea => "auto_laea",
            FrameStrategy::GeographicConstant => "geographic_constant",
            FrameStrategy::EqualWeights => "equal_weights",
        };
        f.write_str(s)
    }
}

/// Metadata recorded wherever a frame decision is made.
#[derive(Debug, Clone, Serialize)]
pub struct FrameMeta {
    pub strategy: FrameStrategy,
    pub frame_id: String,
}

/// A resolved metric transform for one collection.
pub struct MetricFrame {
    kind: FrameKind,
    meta: FrameMeta,
}

enum FrameKind {
    /// Native units are already metres.
    Identity,
    Transform(Arc<dyn Projection>),
}

impl MetricFrame {
    /// Run the selection chain for `fc`. Fails with `NoMetricFrame` when the
    /// CRS is unknown and no projection was supplied.
    pub fn select(
        fc: &FeatureCollection,
        user: Option<Arc<dyn Projection>>,
    ) -> Result<Self, CartaError> {
        if let Some(p) = user {
            let meta = FrameMeta { strategy: FrameStrategy::UserEqualArea, frame_id: p.id() };
            return Ok(Self { kind: FrameKind::Transform(p), meta });
        }
        match fc.crs {
            Crs::Projected => Ok(Self {
                kind: FrameKind::Identity,
                meta: FrameMeta {
                    strategy: FrameStrategy::ProjectedNative,
                    frame_id: "native".into(),
                },
            }),
            Crs::Geographic => {
                let c = collection_centroid(fc).ok_or(CartaError::EmptyCollection)?;
                let laea = Laea::new(c.x, c.y);
                let meta =
                    FrameMeta { strategy: FrameStrategy::AutoLaea, frame_id: laea.id() };
                Ok(Self { kind: FrameKind::Transform(Arc::new(laea)), meta })
            }
            Crs::Unknown => Err(CartaError::NoMetricFrame),
        }
    }

    pub fn meta(&self) -> &FrameMeta {
        &self.meta
    }

    /// Geometry in the metric frame.
    pub fn project(&self, mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        match &self.kind {
            FrameKind::Identity => mp.clone(),
            FrameKind::Transform(p) => mp.map_coords(|c| p.forward(c)),
        }
    }

    /// Back to the collection's native frame.
    pub fn unproject(&self, mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        match &self.kind {
            FrameKind::Identity => mp.clone(),
            FrameKind::Transform(p) => mp.map_coords(|c| p.inverse(c)),
        }
    }
}

/// Area-weighted mean of the per-polygon centroids — the centroid of the
/// union for non-overlapping survey layers.
pub fn collection_centroid(fc: &FeatureCollection) -> Option<Coord<f64>> {
    let mut sx = 0.0;
    let mut sy = 0.0;
    let mut sw = 0.0;
    for f in &fc.features {
        if let Some(c) = f.geometry.centroid() {
            let w = f.geometry.unsigned_area().max(f64::EPSILON);
            sx += c.x() * w;
            sy += c.y() * w;
            sw += w;
        }
    }
    if sw <= 0.0 {
        return None;
    }
    Some(Coord { x: sx / sw, y: sy / sw })
}

/// Per-feature ground areas (m²) in the selected metric frame.
///
/// Strict: propagates `NoMetricFrame`. Color weighting wants the tolerant
/// variant [`area_weights`].
pub fn ground_areas(
    fc: &FeatureCollection,
    user: Option<Arc<dyn Projection>>,
) -> Result<(Vec<f64>, FrameMeta), CartaError> {
    let frame = MetricFrame::select(fc, user)?;
    let areas = fc
        .features
        .iter()
        .map(|f| frame.project(&f.geometry).unsigned_area())
        .collect();
    Ok((areas, frame.meta.clone()))
}

/// Per-feature weights for color mixing: ground areas when a metric frame
/// exists, otherwise 1.0 per feature.
pub fn area_weights(
    fc: &FeatureCollection,
    user: Option<Arc<dyn Projection>>,
) -> (Vec<f64>, FrameMeta) {
    match ground_areas(fc, user) {
        Ok(out) => out,
        Err(_) => (
            vec![1.0; fc.features.len()],
            FrameMeta { strategy: FrameStrategy::EqualWeights, frame_id: "none".into() },
        ),
    }
}

/// Ground width (m) of the collection extent in the metric frame.
pub fn ground_width(
    fc: &FeatureCollection,
    frame: &MetricFrame,
) -> Result<f64, CartaError> {
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    for f in &fc.features {
        if f.is_empty() {
            continue;
        }
        if let Some(rect) = frame.project(&f.geometry).bounding_rect() {
            min_x = min_x.min(rect.min().x);
            max_x = max_x.max(rect.max().x);
        }
    }
    let w = max_x - min_x;
    if !w.is_finite() || w <= 0.0 {
        return Err(CartaError::DegenerateExtent);
    }
    Ok(w)
}

/// Extent width in native degrees, for the fixed-constant opt-out.
pub fn extent_width_degrees(fc: &FeatureCollection) -> Result<f64, CartaError> {
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    for f in &fc.features {
        if let Some(rect) = f.geometry.bounding_rect() {
            min_x = min_x.min(rect.min().x);
            max_x = max_x.max(rect.max().x);
        }
    }
    let w = max_x - min_x;
    if !w.is_finite() || w <= 0.0 {
        return Err(CartaError::DegenerateExtent);
    }
    Ok(w)
}
