//! Pipeline session.
//!
//! Owns the classified layer and every cache derived from it. Caches are
//! versionless on purpose: any change to the layer (reclassification,
//! consolidation, projection change) drops them wholesale, and the next
//! request recomputes. Nothing here is ever patched incrementally.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::classify::{Classifier, ClassifyOptions};
use crate::color::Rgb;
use crate::consolidate::{consolidate, ConsolidateConfig, ConsolidationPlan};
use crate::error::CartaError;
use crate::feature::{ClipBox, FeatureCollection};
use crate::frame::Projection;
use crate::palette::{ColorAudit, ColorResolver, PaletteConfig};
use crate::scale::{compute_scale, ScaleConfig, ScaleResult};

pub struct Session {
    classifier: Classifier,
    classify_opts: ClassifyOptions,
    resolver: ColorResolver,
    scale_config: ScaleConfig,
    consolidate_config: ConsolidateConfig,
    projection: Option<Arc<dyn Projection>>,

    layer: Option<FeatureCollection>,
    colors: Option<(BTreeMap<String, Rgb>, ColorAudit)>,
    plan: Option<ConsolidationPlan>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    /// Build a session, rejecting unusable figure or threshold settings
    /// before any data is touched.
    pub fn new(
        classifier: Classifier,
        classify_opts: ClassifyOptions,
        palette: PaletteConfig,
        scale_config: ScaleConfig,
        consolidate_config: ConsolidateConfig,
    ) -> Result<Self, CartaError> {
        scale_config.validate()?;
        consolidate_config.validate()?;
        let resolver = ColorResolver::new(palette, classifier.fields().clone());
        Ok(Self {
            classifier,
            classify_opts,
            resolver,
            scale_config,
            consolidate_config,
            projection: None,
            layer: None,
            colors: None,
            plan: None,
        })
    }

    /// Supply an equal-area projection; it wins over every automatic frame.
    pub fn set_projection(&mut self, projection: Option<Arc<dyn Projection>>) {
        self.projection = projection;
        self.invalidate();
    }

    pub fn layer(&self) -> Option<&FeatureCollection> {
        self.layer.as_ref()
    }

    /// Classify `fc` and make it the session layer.
    pub fn classify(&mut self, fc: &FeatureCollection) -> Result<&FeatureCollection, CartaError> {
        let classified =
            self.classifier
                .classify(fc, &self.classify_opts, self.projection.clone())?;
        self.invalidate();
        Ok(self.layer.insert(classified))
    }

    /// Per-group color map and its audit trail, cached until the layer changes.
    pub fn colors(&mut self) -> Result<&(BTreeMap<String, Rgb>, ColorAudit), CartaError> {
        let layer = self.layer.as_ref().ok_or(CartaError::NoLayer)?;
        Ok(self
            .colors
            .get_or_insert_with(|| self.resolver.resolve(layer, self.projection.clone())))
    }

    /// Scale of the current layer under the session's figure settings.
    pub fn scale(&self) -> Result<ScaleResult, CartaError> {
        let layer = self.layer.as_ref().ok_or(CartaError::NoLayer)?;
        compute_scale(layer, &self.scale_config, self.projection.clone())
    }

    /// Clip the layer to a window; the clipped layer replaces the session
    /// layer, so the color mixes recompute over what remains.
    pub fn clip(&mut self, window: &ClipBox) -> Result<&FeatureCollection, CartaError> {
        let layer = self.layer.as_ref().ok_or(CartaError::NoLayer)?;
        let clipped = layer.clip(window)?;
        self.invalidate();
        Ok(self.layer.insert(clipped))
    }

    /// Consolidate the current layer in place; the plan stays queryable until
    /// the next layer change.
    pub fn consolidate(&mut self) -> Result<&ConsolidationPlan, CartaError> {
        let layer = self.layer.as_ref().ok_or(CartaError::NoLayer)?;
        let (out, plan) =
            consolidate(layer, &self.consolidate_config, self.projection.clone())?;
        self.invalidate();
        self.layer = Some(out);
        Ok(self.plan.insert(plan))
    }

    pub fn last_plan(&self) -> Option<&ConsolidationPlan> {
        self.plan.as_ref()
    }

    fn invalidate(&mut self) {
        self.colors = None;
        self.plan = None;
    }
}
