//! Tile coordinate types.

use std::fmt;

use thiserror::Error;

/// Maximum canonical zoom level accepted for model tiles.
pub const MAX_ZOOM: u8 = 24;

/// Minimum latitude representable in Web Mercator.
pub const MIN_LAT: f64 = -85.05112878;

/// Maximum latitude representable in Web Mercator.
pub const MAX_LAT: f64 = 85.05112878;

/// Errors raised when a tile coordinate is out of range.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Zoom level above [`MAX_ZOOM`].
    #[error("Invalid zoom level: {0} (max 24)")]
    InvalidZoom(u8),

    /// Column or row outside the `2^zoom` grid.
    #[error("Tile {x}/{y} is outside the grid at zoom {zoom}")]
    OutOfGrid { x: u32, y: u32, zoom: u8 },

    /// Overscaled zoom lower than the canonical zoom.
    #[error("Overscaled zoom {overscaled} is below canonical zoom {zoom}")]
    InvalidOverscale { overscaled: u8, zoom: u8 },
}

/// Web Mercator tile address with world wrap and overscaling.
///
/// `x` increases eastward and `y` southward. `wrap` selects which copy of the
/// world the tile belongs to; `overscaled_zoom` is the zoom the tile is
/// rendered at, which may exceed `zoom` when the source has no deeper data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Canonical zoom level.
    pub zoom: u8,
    /// World copy index (0 for the primary world).
    pub wrap: i32,
    /// Tile column.
    pub x: u32,
    /// Tile row.
    pub y: u32,
    /// Zoom the tile is displayed at.
    pub overscaled_zoom: u8,
}

impl TileCoord {
    /// Creates a canonical, non-wrapped coordinate.
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self {
            zoom,
            wrap: 0,
            x,
            y,
            overscaled_zoom: zoom,
        }
    }

    /// Sets the world copy index.
    pub fn with_wrap(mut self, wrap: i32) -> Self {
        self.wrap = wrap;
        self
    }

    /// Sets the overscaled zoom.
    pub fn with_overscaled_zoom(mut self, overscaled_zoom: u8) -> Self {
        self.overscaled_zoom = overscaled_zoom;
        self
    }

    /// Checks that the coordinate addresses a real tile.
    pub fn validate(&self) -> Result<(), CoordError> {
        if self.zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(self.zoom));
        }
        let n = 1u64 << self.zoom;
        if u64::from(self.x) >= n || u64::from(self.y) >= n {
            return Err(CoordError::OutOfGrid {
                x: self.x,
                y: self.y,
                zoom: self.zoom,
            });
        }
        if self.overscaled_zoom < self.zoom {
            return Err(CoordError::InvalidOverscale {
                overscaled: self.overscaled_zoom,
                zoom: self.zoom,
            });
        }
        Ok(())
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)?;
        if self.wrap != 0 {
            write!(f, "@w{}", self.wrap)?;
        }
        if self.overscaled_zoom != self.zoom {
            write!(f, "^{}", self.overscaled_zoom)?;
        }
        Ok(())
    }
}
