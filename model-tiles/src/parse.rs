//! Parse pipeline: decoded scene to per-family geometry buckets.
//!
//! # Stages
//!
//! ```text
//! bytes ──► SceneDecoder ──► DecodedScene ──► for each rule family:
//!                                              1. record rule ids in FeatureIndex
//!                                              2. evaluate lead rule
//!                                              3. convert scene into ModelBucket
//!                                              4. mark upload-ready (no mesh features)
//!                                              5. first feature evaluation pass
//!                                          ──► TilePayload
//! ```
//!
//! Decoding is the only suspension point. [`decode_scene`] runs it under the
//! worker's decode limiter; [`ParsePipeline::build`] is synchronous so the
//! worker can re-check the tile's liveness between the two halves.

use bytes::Bytes;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::bucket::ModelBucket;
use crate::coord::meters_per_tile_unit;
use crate::decode::{DecodedScene, SceneDecoder};
use crate::error::TileError;
use crate::feature_index::{FeatureIndex, FeatureIndexFactory, PromoteId};
use crate::style::StyleRuleIndex;
use crate::tile::TileRequest;

/// Marker for payload slots that other tile kinds fill and this pipeline
/// never produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadSlot {
    #[default]
    NotApplicable,
}

/// Result of a successful parse.
#[derive(Debug)]
pub struct TilePayload {
    /// One bucket per rule family, in declaration order.
    pub buckets: Vec<ModelBucket>,
    /// Feature index for hit-testing.
    pub feature_index: FeatureIndex,
    pub glyph_atlas: PayloadSlot,
    pub image_atlas: PayloadSlot,
    pub line_atlas: PayloadSlot,
}

/// Synchronous half of the parse pipeline.
pub struct ParsePipeline<'a> {
    rules: &'a dyn StyleRuleIndex,
    feature_indexes: &'a dyn FeatureIndexFactory,
    tile_extent: u32,
    promote_id: PromoteId,
}

impl<'a> ParsePipeline<'a> {
    /// Creates a pipeline over the given collaborators.
    pub fn new(
        rules: &'a dyn StyleRuleIndex,
        feature_indexes: &'a dyn FeatureIndexFactory,
        tile_extent: u32,
        promote_id: PromoteId,
    ) -> Self {
        Self {
            rules,
            feature_indexes,
            tile_extent,
            promote_id,
        }
    }

    /// Builds the payload for `scene`.
    ///
    /// `brightness` is the record's live value, which a reload may have
    /// changed since the request was issued.
    ///
    /// # Errors
    ///
    /// The first style or geometry error aborts the build; no partial
    /// buckets are returned.
    pub fn build(
        &self,
        scene: &DecodedScene,
        request: &TileRequest,
        brightness: f32,
    ) -> Result<TilePayload, TileError> {
        let capabilities = scene.capabilities();
        let units_per_meter = 1.0 / meters_per_tile_unit(&request.coord, self.tile_extent);
        let params = request.evaluation_parameters(brightness);

        let mut feature_index = self
            .feature_indexes
            .create(request.coord, self.promote_id.clone());
        let families = self.rules.families(&request.source_layer);
        let mut buckets = Vec::with_capacity(families.len());

        for family in families {
            let rule_ids = family.rule_ids();
            feature_index.insert_family(rule_ids.clone());

            let lead = family.lead();
            let style = lead.evaluate(&params)?;

            let mut bucket = ModelBucket::from_scene(
                scene,
                rule_ids,
                style,
                capabilities,
                units_per_meter,
                brightness,
            )?;
            if !bucket.needs_feature_evaluation() {
                bucket.mark_upload_ready();
            }
            bucket.evaluate(lead.as_ref(), &params)?;

            buckets.push(bucket);
        }

        debug!(
            tile_id = request.id,
            coord = %request.coord,
            buckets = buckets.len(),
            meshes = scene.mesh_count(),
            mesh_features = capabilities.mesh_features,
            meshopt = capabilities.meshopt_compression,
            "Built model buckets"
        );

        Ok(TilePayload {
            buckets,
            feature_index,
            glyph_atlas: PayloadSlot::NotApplicable,
            image_atlas: PayloadSlot::NotApplicable,
            line_atlas: PayloadSlot::NotApplicable,
        })
    }
}

/// Decodes `bytes` once a permit from `limiter` is available.
///
/// # Errors
///
/// `TileError::WorkerShutdown` if the limiter is closed, otherwise the
/// decoder's error.
pub async fn decode_scene(
    decoder: &dyn SceneDecoder,
    limiter: &Semaphore,
    bytes: Bytes,
) -> Result<DecodedScene, TileError> {
    let _permit = limiter
        .acquire()
        .await
        .map_err(|_| TileError::WorkerShutdown)?;
    Ok(decoder.decode(bytes).await?)
}
