//! Coordinate conversion module
//!
//! Provides the Web Mercator math the parse pipeline needs: the geographic
//! corner of a tile and the size of one tile unit in meters, used to bring
//! model geometry authored in meters into tile space.

mod types;

pub use types::{CoordError, TileCoord, MAX_LAT, MAX_ZOOM, MIN_LAT};

use std::f64::consts::PI;

/// Earth circumference at the equator in meters.
pub const EARTH_CIRCUMFERENCE_METERS: f64 = 40_075_017.0;

/// Default number of tile units along one tile edge.
pub const DEFAULT_TILE_EXTENT: u32 = 8192;

/// Converts tile coordinates back to geographic coordinates.
///
/// Returns the latitude/longitude of the tile's northwest corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileCoord) -> (f64, f64) {
    let n = 2.0_f64.powi(tile.zoom as i32);

    let lon = tile.x as f64 / n * 360.0 - 180.0;

    // Inverse Web Mercator
    let y = tile.y as f64 / n;
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    let lat = lat_rad * 180.0 / PI;

    (lat, lon)
}

/// Size of one tile unit in meters, measured along the tile's northern edge.
///
/// # Arguments
///
/// * `tile` - The canonical tile
/// * `extent` - Number of tile units along one tile edge
#[inline]
pub fn meters_per_tile_unit(tile: &TileCoord, extent: u32) -> f64 {
    let (lat, _) = tile_to_lat_lon(tile);
    let tiles = 2.0_f64.powi(tile.zoom as i32);
    EARTH_CIRCUMFERENCE_METERS * lat.to_radians().cos() / tiles / extent as f64
}
