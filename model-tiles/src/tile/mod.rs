//! Tile request and per-request record types.

mod record;
mod request;

pub use record::{PendingReload, TileRecord, TileStatus};
pub use request::{Projection, RenderParameters, TileId, TileRequest};
