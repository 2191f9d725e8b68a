//! Terminal error type delivered to tile completion handles.

use thiserror::Error;

use crate::coord::CoordError;
use crate::decode::DecodeError;
use crate::fetch::FetchError;
use crate::style::StyleError;
use crate::tile::TileId;

/// Errors that end a tile request.
///
/// Every variant is terminal: the worker never retries. Empty payloads and
/// stale (aborted) requests are not errors; they are reported through
/// [`TileOutcome`](crate::TileOutcome).
#[derive(Debug, Error)]
pub enum TileError {
    /// The fetch collaborator failed.
    #[error("Transport error: {0}")]
    Transport(#[from] FetchError),

    /// The fetched bytes could not be decoded into a scene.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A style rule failed during first-pass evaluation.
    #[error("Style evaluation error: {0}")]
    Style(#[from] StyleError),

    /// The decoded scene is inconsistent with the tile being built.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The request carried an invalid tile coordinate.
    #[error("Invalid tile coordinate: {0}")]
    InvalidCoord(#[from] CoordError),

    /// A load with this identifier is already in flight.
    #[error("Tile {0} is already loading")]
    DuplicateRequest(TileId),

    /// A newer reload replaced this one before it could start.
    #[error("Reload of tile {0} was superseded by a newer reload")]
    ReloadSuperseded(TileId),

    /// The tile was aborted while this reload was waiting.
    #[error("Reload of tile {0} was cancelled by abort")]
    ReloadCancelled(TileId),

    /// The worker was dropped or shut down before the request finished.
    #[error("Worker shut down")]
    WorkerShutdown,

    /// The worker was created outside a Tokio runtime.
    #[error("No Tokio runtime available")]
    NoRuntime,
}

impl TileError {
    /// Returns true if this error came from the fetch collaborator.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if this error reports a dropped reload continuation.
    pub fn is_dropped_reload(&self) -> bool {
        matches!(self, Self::ReloadSuperseded(_) | Self::ReloadCancelled(_))
    }
}
