//! Geometry batches ("buckets") produced by the parse pipeline.
//!
//! A [`ModelBucket`] holds the scene geometry for one rule family, converted
//! from meters into tile units, together with the family's evaluated style
//! values and the asset's capability flags.

use std::collections::{BTreeMap, BTreeSet};

use crate::decode::{DecodedScene, MeshPrimitive, ModelCapabilities, SceneNode};
use crate::error::TileError;
use crate::style::{EvaluationParameters, StyleError, StyleRule, StyleValues};

/// Mesh geometry in tile units.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketMesh {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub feature_ids: Option<Vec<u32>>,
}

/// A flattened scene node with its absolute translation in tile units.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketNode {
    pub name: Option<String>,
    pub translation: [f64; 3],
    pub meshes: Vec<BucketMesh>,
}

/// Render-ready geometry and style for one rule family within one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBucket {
    rule_ids: Vec<String>,
    nodes: Vec<BucketNode>,
    style: StyleValues,
    capabilities: ModelCapabilities,
    brightness: f32,
    upload_ready: bool,
    feature_attributes: BTreeMap<u32, StyleValues>,
    evaluated: bool,
}

impl ModelBucket {
    /// Converts `scene` into a bucket for the family `rule_ids`.
    ///
    /// Positions and translations are multiplied by `units_per_meter`. Nodes
    /// are flattened depth-first; nodes without meshes only contribute their
    /// translation to their descendants.
    pub fn from_scene(
        scene: &DecodedScene,
        rule_ids: Vec<String>,
        style: StyleValues,
        capabilities: ModelCapabilities,
        units_per_meter: f64,
        brightness: f32,
    ) -> Result<Self, TileError> {
        if !units_per_meter.is_finite() || units_per_meter <= 0.0 {
            return Err(TileError::Parse(format!(
                "invalid tile scale {}",
                units_per_meter
            )));
        }

        let mut nodes = Vec::new();
        for node in &scene.nodes {
            flatten(node, [0.0; 3], units_per_meter, &mut nodes)?;
        }

        Ok(Self {
            rule_ids,
            nodes,
            style,
            capabilities,
            brightness,
            upload_ready: false,
            feature_attributes: BTreeMap::new(),
            evaluated: false,
        })
    }

    /// Runs one feature-family evaluation pass with `rule`.
    ///
    /// Buckets with mesh features get one attribute set per distinct feature
    /// id. Other buckets only record that the pass ran.
    pub fn evaluate(
        &mut self,
        rule: &dyn StyleRule,
        params: &EvaluationParameters,
    ) -> Result<(), StyleError> {
        self.feature_attributes.clear();
        if self.capabilities.mesh_features {
            for feature_id in self.feature_ids() {
                let values = rule.evaluate_feature(feature_id, params)?;
                self.feature_attributes.insert(feature_id, values);
            }
        }
        self.brightness = params.brightness;
        self.evaluated = true;
        Ok(())
    }

    /// Marks the bucket as ready for GPU upload.
    pub fn mark_upload_ready(&mut self) {
        self.upload_ready = true;
    }

    /// True if upload must wait for a per-feature evaluation pass.
    pub fn needs_feature_evaluation(&self) -> bool {
        self.capabilities.mesh_features
    }

    /// Distinct feature ids across all meshes, ascending.
    pub fn feature_ids(&self) -> BTreeSet<u32> {
        self.nodes
            .iter()
            .flat_map(|n| n.meshes.iter())
            .filter_map(|m| m.feature_ids.as_ref())
            .flatten()
            .copied()
            .collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.nodes
            .iter()
            .flat_map(|n| n.meshes.iter())
            .map(|m| m.positions.len())
            .sum()
    }

    pub fn rule_ids(&self) -> &[String] {
        &self.rule_ids
    }

    pub fn nodes(&self) -> &[BucketNode] {
        &self.nodes
    }

    pub fn style(&self) -> &StyleValues {
        &self.style
    }

    pub fn capabilities(&self) -> ModelCapabilities {
        self.capabilities
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn is_upload_ready(&self) -> bool {
        self.upload_ready
    }

    pub fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    pub fn feature_attributes(&self) -> &BTreeMap<u32, StyleValues> {
        &self.feature_attributes
    }
}

fn flatten(
    node: &SceneNode,
    parent: [f64; 3],
    scale: f64,
    out: &mut Vec<BucketNode>,
) -> Result<(), TileError> {
    let translation = [
        parent[0] + node.translation[0] * scale,
        parent[1] + node.translation[1] * scale,
        parent[2] + node.translation[2] * scale,
    ];

    if !node.meshes.is_empty() {
        let meshes = node
            .meshes
            .iter()
            .map(|m| convert_mesh(m, scale))
            .collect::<Result<Vec<_>, _>>()?;
        out.push(BucketNode {
            name: node.name.clone(),
            translation,
            meshes,
        });
    }

    for child in &node.children {
        flatten(child, translation, scale, out)?;
    }
    Ok(())
}

fn convert_mesh(mesh: &MeshPrimitive, scale: f64) -> Result<BucketMesh, TileError> {
    let vertex_count = mesh.positions.len();

    if let Some(bad) = mesh.indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(TileError::Parse(format!(
            "index {} out of range for {} vertices",
            bad, vertex_count
        )));
    }
    if let Some(ids) = &mesh.feature_ids {
        if ids.len() != vertex_count {
            return Err(TileError::Parse(format!(
                "{} feature ids for {} vertices",
                ids.len(),
                vertex_count
            )));
        }
    }

    let scale = scale as f32;
    let positions = mesh
        .positions
        .iter()
        .map(|p| [p[0] * scale, p[1] * scale, p[2] * scale])
        .collect();

    Ok(BucketMesh {
        positions,
        indices: mesh.indices.clone(),
        feature_ids: mesh.feature_ids.clone(),
    })
}
