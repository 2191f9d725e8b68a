//! Tile load request types.
//!
//! Provides the `TileRequest` type that carries everything needed to fetch
//! and parse one model tile. A request is immutable for the duration of one
//! load; reloads arrive as new requests with the same identifier.

use crate::coord::TileCoord;
use crate::style::EvaluationParameters;

/// Caller-assigned tile identity, unique among concurrently active requests.
pub type TileId = u64;

/// Map projection the tile is rendered with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Projection {
    #[default]
    Mercator,
    Globe,
}

/// Rendering-time parameters that influence style evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParameters {
    /// Scene brightness in `0.0..=1.0`.
    pub brightness: f32,
    /// Worldview tag, if the style filters on one.
    pub worldview: Option<String>,
}

impl Default for RenderParameters {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            worldview: None,
        }
    }
}

/// Request to load one model tile.
///
/// # Example
///
/// ```
/// use model_tiles::coord::TileCoord;
/// use model_tiles::tile::TileRequest;
///
/// let request = TileRequest::new(7, TileCoord::new(10, 3, 5), "https://tiles.example/10/3/5.glb")
///     .with_source("landmarks", "buildings")
///     .with_brightness(0.4);
/// assert_eq!(request.id, 7);
/// assert_eq!(request.params.brightness, 0.4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    /// Caller-assigned identity.
    pub id: TileId,
    /// Tile address.
    pub coord: TileCoord,
    /// Source the tile belongs to.
    pub source_id: String,
    /// Source layer whose rule families style this tile.
    pub source_layer: String,
    /// Locator handed to the fetch collaborator.
    pub locator: String,
    /// Device pixel ratio.
    pub pixel_ratio: f32,
    /// Tile size in pixels.
    pub tile_size: u32,
    /// Projection at request time.
    pub projection: Projection,
    /// Brightness and worldview.
    pub params: RenderParameters,
}

impl TileRequest {
    /// Create a new request with default source, projection and parameters.
    pub fn new(id: TileId, coord: TileCoord, locator: impl Into<String>) -> Self {
        Self {
            id,
            coord,
            source_id: String::new(),
            source_layer: String::new(),
            locator: locator.into(),
            pixel_ratio: 1.0,
            tile_size: 512,
            projection: Projection::default(),
            params: RenderParameters::default(),
        }
    }

    /// Set the source id and source layer.
    pub fn with_source(mut self, source_id: impl Into<String>, source_layer: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self.source_layer = source_layer.into();
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_brightness(mut self, brightness: f32) -> Self {
        self.params.brightness = brightness;
        self
    }

    pub fn with_worldview(mut self, worldview: impl Into<String>) -> Self {
        self.params.worldview = Some(worldview.into());
        self
    }

    pub fn with_pixel_ratio(mut self, pixel_ratio: f32) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Evaluation parameters for this request, with `brightness` overriding
    /// the request's own value.
    pub fn evaluation_parameters(&self, brightness: f32) -> EvaluationParameters {
        EvaluationParameters {
            zoom: self.coord.overscaled_zoom as f32,
            brightness,
            worldview: self.params.worldview.clone(),
        }
    }
}
