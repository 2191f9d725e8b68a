//! Per-tile feature index used later for hit-testing.

use crate::coord::TileCoord;

/// Policy mapping decoded features to stable external identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PromoteId {
    /// Use the decoder-assigned feature identifier.
    #[default]
    None,
    /// Promote the named feature property to the identifier.
    Property(String),
}

/// Records which rule families a tile's buckets belong to.
///
/// Built fresh on every parse and not mutated once the parse completes.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureIndex {
    coord: TileCoord,
    promote_id: PromoteId,
    families: Vec<Vec<String>>,
}

impl FeatureIndex {
    /// Creates an empty index for `coord`.
    pub fn new(coord: TileCoord, promote_id: PromoteId) -> Self {
        Self {
            coord,
            promote_id,
            families: Vec::new(),
        }
    }

    /// Records the member rule identifiers of one family.
    pub fn insert_family(&mut self, rule_ids: Vec<String>) {
        self.families.push(rule_ids);
    }

    /// Number of families recorded.
    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    /// Recorded families in insertion order.
    pub fn families(&self) -> &[Vec<String>] {
        &self.families
    }

    /// Returns true if any recorded family contains `rule_id`.
    pub fn contains_rule(&self, rule_id: &str) -> bool {
        self.families.iter().flatten().any(|id| id == rule_id)
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn promote_id(&self) -> &PromoteId {
        &self.promote_id
    }
}

/// Constructs feature indexes for the parse pipeline.
pub trait FeatureIndexFactory: Send + Sync {
    /// Creates an empty index for one parse.
    fn create(&self, coord: TileCoord, promote_id: PromoteId) -> FeatureIndex;
}

/// Factory returning plain [`FeatureIndex`] values.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFeatureIndexFactory;

impl FeatureIndexFactory for DefaultFeatureIndexFactory {
    fn create(&self, coord: TileCoord, promote_id: PromoteId) -> FeatureIndex {
        FeatureIndex::new(coord, promote_id)
    }
}
