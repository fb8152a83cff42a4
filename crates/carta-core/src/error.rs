//! Error type shared across the crate.
//!
//! Configuration problems are rejected when the config is built, not when the
//! pipeline runs. Color resolution is total and never appears here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CartaError {
    /// Unknown physical unit string in a scale or margin setting.
    #[error("invalid unit '{0}'; use 'mm', 'cm', 'in', or 'px'")]
    InvalidUnit(String),

    /// A pixel-based width or margin was requested without a usable DPI.
    #[error("pixel units require a positive dpi")]
    PixelUnitNeedsDpi,

    /// The minimum visible area threshold must be strictly positive.
    #[error("minimum visible area must be > 0 mm² (got {0})")]
    InvalidMinArea(f64),

    /// A column the classification depends on is absent from the input.
    #[error("required column '{0}' is missing from the feature collection")]
    MissingColumn(String),

    /// No features (or only empty geometries) to work with.
    #[error("the feature collection is empty")]
    EmptyCollection,

    /// A session stage was requested before any layer was classified.
    #[error("no classified layer; run classify first")]
    NoLayer,

    /// The clip window has zero or negative extent, or non-finite bounds.
    #[error("clip window is degenerate or non-finite")]
    InvalidClipBox,

    /// The clip window does not intersect any feature.
    #[error("the clip removed every feature")]
    EmptyClip,

    /// The collection's ground extent has zero or non-finite width.
    #[error("degenerate extent: ground width is zero or non-finite")]
    DegenerateExtent,

    /// An area-based operation was requested but no metric reference frame
    /// could be established and the approximate opt-out was not chosen.
    #[error(
        "no metric reference frame: supply an equal-area projection, projected \
         data, or enable the approximate degree conversion"
    )]
    NoMetricFrame,
}
