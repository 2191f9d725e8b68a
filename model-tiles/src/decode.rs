//! Decoder collaborator interface and the decoded scene graph.
//!
//! The binary asset format is opaque to the worker. A [`SceneDecoder`] turns
//! fetched bytes into a [`DecodedScene`]: a tree of nodes carrying mesh
//! primitives in meters, plus the list of format extensions the asset
//! declares. Only two extensions matter here; see [`ModelCapabilities`].

use bytes::Bytes;
use thiserror::Error;

use crate::fetch::BoxFuture;

/// Extension name declaring per-vertex mesh feature identifiers.
pub const EXT_MESH_FEATURES: &str = "EXT_mesh_features";

/// Extension name declaring meshopt vertex compression.
pub const EXT_MESHOPT_COMPRESSION: &str = "EXT_meshopt_compression";

/// Errors produced while decoding asset bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The bytes are not a well-formed asset.
    #[error("Malformed asset: {0}")]
    Malformed(String),

    /// The asset uses a feature the decoder does not support.
    #[error("Unsupported asset: {0}")]
    Unsupported(String),
}

/// Converts raw tile bytes into a scene graph.
pub trait SceneDecoder: Send + Sync {
    /// Decodes one tile payload.
    fn decode(&self, bytes: Bytes) -> BoxFuture<'_, Result<DecodedScene, DecodeError>>;
}

/// A decoded model tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedScene {
    /// Extension names declared by the asset.
    pub extensions_used: Vec<String>,
    /// Root nodes of the scene.
    pub nodes: Vec<SceneNode>,
}

impl DecodedScene {
    /// Capability flags declared by this asset.
    pub fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities::from_extensions(&self.extensions_used)
    }

    /// Total number of mesh primitives across the whole tree.
    pub fn mesh_count(&self) -> usize {
        fn count(node: &SceneNode) -> usize {
            node.meshes.len() + node.children.iter().map(count).sum::<usize>()
        }
        self.nodes.iter().map(count).sum()
    }
}

/// A node in the decoded scene tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneNode {
    /// Optional node name from the asset.
    pub name: Option<String>,
    /// Translation relative to the parent, in meters.
    pub translation: [f64; 3],
    /// Mesh primitives attached to this node.
    pub meshes: Vec<MeshPrimitive>,
    /// Child nodes.
    pub children: Vec<SceneNode>,
}

/// Indexed triangle geometry in meters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshPrimitive {
    /// Vertex positions.
    pub positions: Vec<[f32; 3]>,
    /// Triangle indices into `positions`.
    pub indices: Vec<u32>,
    /// Per-vertex feature identifiers, present with `EXT_mesh_features`.
    pub feature_ids: Option<Vec<u32>>,
}

/// Closed set of asset capabilities carried by every geometry batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModelCapabilities {
    /// Vertices carry mesh feature identifiers.
    pub mesh_features: bool,
    /// Vertex data uses meshopt compression.
    pub meshopt_compression: bool,
}

impl ModelCapabilities {
    /// Derives capabilities from declared extension names.
    pub fn from_extensions<S: AsRef<str>>(extensions: &[S]) -> Self {
        let mut caps = Self::default();
        for ext in extensions {
            match ext.as_ref() {
                EXT_MESH_FEATURES => caps.mesh_features = true,
                EXT_MESHOPT_COMPRESSION => caps.meshopt_compression = true,
                _ => {}
            }
        }
        caps
    }
}
