//! Map-scale computation.
//!
//! The scale denominator comes from the ground width of the layer extent and
//! the printable content width of the figure. Figure dimensions accept paper
//! and pixel units; pixels need a dpi to mean anything. The exact denominator
//! can optionally be rounded to a cartographic "nice" value.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CartaError;
use crate::feature::FeatureCollection;
use crate::frame::{
    extent_width_degrees, ground_width, FrameMeta, FrameStrategy, MetricFrame, Projection,
    METERS_PER_DEGREE,
};

const MM_PER_INCH: f64 = 25.4;

/// Figure measurement units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    Mm,
    Cm,
    In,
    Px,
}

impl Unit {
    /// Length in millimetres; pixels require dpi.
    fn to_mm(self, value: f64, dpi: Option<f64>) -> Result<f64, CartaError> {
        Ok(match self {
            Unit::Mm => value,
            Unit::Cm => value * 10.0,
            Unit::In => value * MM_PER_INCH,
            Unit::Px => match dpi {
                Some(d) if d > 0.0 => value * MM_PER_INCH / d,
                _ => return Err(CartaError::PixelUnitNeedsDpi),
            },
        })
    }
}

impl FromStr for Unit {
    type Err = CartaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mm" => Ok(Unit::Mm),
            "cm" => Ok(Unit::Cm),
            "in" | "inch" => Ok(Unit::In),
            "px" | "pixel" => Ok(Unit::Px),
            other => Err(CartaError::InvalidUnit(other.to_string())),
        }
    }
}

/// How to snap the exact denominator to a nice value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundMode {
    /// Smallest nice value not below the exact denominator, so the map never
    /// overflows the figure.
    Ceil,
    /// Nice value with the smallest absolute error.
    Nearest,
}

/// Figure geometry and rounding policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleConfig {
    pub fig_width: f64,
    pub width_unit: Unit,
    pub dpi: Option<f64>,
    pub margin: f64,
    pub margin_unit: Unit,
    /// `None` keeps the exact denominator.
    pub round: Option<RoundMode>,
    /// Measure the extent with the fixed 1° ≈ 108 km constant instead of a
    /// metric frame. Only sensible for geographic layers.
    pub degree_constant: bool,
}

impl ScaleConfig {
    /// Reject settings that can never measure a figure. `compute_scale`
    /// re-checks, so a config mutated after validation still fails cleanly.
    pub fn validate(&self) -> Result<(), CartaError> {
        let needs_dpi = self.width_unit == Unit::Px || self.margin_unit == Unit::Px;
        if needs_dpi && !matches!(self.dpi, Some(d) if d > 0.0) {
            return Err(CartaError::PixelUnitNeedsDpi);
        }
        Ok(())
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            fig_width: 180.0,
            width_unit: Unit::Mm,
            dpi: Some(300.0),
            margin: 0.0,
            margin_unit: Unit::Mm,
            round: Some(RoundMode::Ceil),
            degree_constant: false,
        }
    }
}

/// Outcome of one scale computation.
#[derive(Debug, Clone, Serialize)]
pub struct ScaleResult {
    /// Final denominator (the N of 1:N).
    pub denominator: u64,
    /// Denominator before rounding.
    pub exact: f64,
    pub ground_width_m: f64,
    pub content_width_mm: f64,
    pub frame: FrameMeta,
}

/// Compute the scale of a collection for the given figure.
pub fn compute_scale(
    fc: &FeatureCollection,
    config: &ScaleConfig,
    user: Option<Arc<dyn Projection>>,
) -> Result<ScaleResult, CartaError> {
    if fc.is_empty() {
        return Err(CartaError::EmptyCollection);
    }
    let paper_mm = config.width_unit.to_mm(config.fig_width, config.dpi)?;
    let margin_mm = config.margin_unit.to_mm(config.margin, config.dpi)?;
    let content_mm = (paper_mm - 2.0 * margin_mm).max(1e-6);

    let (width_m, frame) = if config.degree_constant {
        let deg = extent_width_degrees(fc)?;
        (
            deg * METERS_PER_DEGREE,
            FrameMeta {
                strategy: FrameStrategy::GeographicConstant,
                frame_id: "deg*108000".into(),
            },
        )
    } else {
        let frame = MetricFrame::select(fc, user)?;
        (ground_width(fc, &frame)?, frame.meta().clone())
    };

    let exact = width_m * 1_000.0 / content_mm;
    let denominator = match config.round {
        Some(mode) => nice_round(exact, mode),
        None => exact.round() as u64,
    };

    Ok(ScaleResult {
        denominator,
        exact,
        ground_width_m: width_m,
        content_width_mm: content_mm,
        frame,
    })
}

const NICE_STEPS: [f64; 5] = [1.0, 2.0, 2.5, 5.0, 10.0];

/// Snap to the {1, 2, 2.5, 5} × 10^k series.
fn nice_round(exact: f64, mode: RoundMode) -> u64 {
    if exact <= 0.0 {
        return 0;
    }
    let base = 10f64.powf(exact.log10().floor());
    match mode {
        RoundMode::Ceil => {
            for step in NICE_STEPS {
                let cand = step * base;
                if cand >= exact * (1.0 - 1e-12) {
                    return cand.round() as u64;
                }
            }
            (10.0 * base).round() as u64
        }
        RoundMode::Nearest => {
            let mut best = base;
            let mut err = f64::INFINITY;
            for step in NICE_STEPS {
                let cand = step * base;
                let e = (cand - exact).abs();
                if e < err {
                    err = e;
                    best = cand;
                }
            }
            best.round() as u64
        }
    }
}
