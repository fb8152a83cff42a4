//! Classification, color resolution, and scale-driven consolidation for
//! geological map layers.
//!
//! The pipeline is a one-shot batch transform over an in-memory
//! [`FeatureCollection`]: structured unit codes are parsed into coarse groups
//! and checked against the declared eon/era ranges, each group gets a legend
//! color resolved from several weighted sources with deterministic collision
//! reduction, and polygons too small for the output scale are absorbed into
//! their neighbors. [`Session`] wires the stages together and owns the
//! derived caches.

pub mod classify;
pub mod color;
pub mod consolidate;
pub mod error;
pub mod feature;
pub mod frame;
pub mod palette;
pub mod scale;
pub mod session;
pub mod text;

pub use classify::{Classifier, ClassifyOptions, EnforceMode};
pub use color::Rgb;
pub use consolidate::{consolidate, ConsolidateConfig, ConsolidationPlan};
pub use error::CartaError;
pub use feature::{ClipBox, Crs, Feature, FeatureCollection, FieldConfig};
pub use frame::{Laea, Projection};
pub use palette::{ColorAudit, ColorResolver, Palette, PaletteConfig, StylePalettes};
pub use scale::{compute_scale, RoundMode, ScaleConfig, ScaleResult, Unit};
pub use session::Session;
