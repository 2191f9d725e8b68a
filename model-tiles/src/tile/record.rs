//! Per-request state owned by the worker.

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::request::{Projection, TileId, TileRequest};
use crate::coord::TileCoord;
use crate::handle::TileResult;

/// Lifecycle status of a tile record.
///
/// `Fetching -> Parsing -> Done`, or `Fetching -> Done` when the fetch fails
/// or returns nothing. A record never leaves `Done`; a later load for the same
/// id creates a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileStatus {
    Fetching,
    Parsing,
    Done,
}

/// A reload parked until the record's current load reaches `Done`.
#[derive(Debug)]
pub struct PendingReload {
    /// The newest request for this id.
    pub request: TileRequest,
    /// Completion handle of the reload caller.
    pub sender: oneshot::Sender<TileResult>,
}

/// Per-request state bundle.
#[derive(Debug)]
pub struct TileRecord {
    id: TileId,
    generation: u64,
    coord: TileCoord,
    source_id: String,
    status: TileStatus,
    projection: Projection,
    brightness: f32,
    pending_reload: Option<PendingReload>,
    cancel: CancellationToken,
}

impl TileRecord {
    /// Creates a `Fetching` record for `request`.
    pub fn new(request: &TileRequest, generation: u64) -> Self {
        Self {
            id: request.id,
            generation,
            coord: request.coord,
            source_id: request.source_id.clone(),
            status: TileStatus::Fetching,
            projection: request.projection,
            brightness: request.params.brightness,
            pending_reload: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    /// Distinguishes successive records created for the same id.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn status(&self) -> TileStatus {
        self.status
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn has_pending_reload(&self) -> bool {
        self.pending_reload.is_some()
    }

    /// Token cancelled when the record is aborted.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn set_status(&mut self, status: TileStatus) {
        self.status = status;
    }

    /// Applies the live parameters of a reload without touching status.
    pub(crate) fn apply_reload_parameters(&mut self, request: &TileRequest) {
        self.projection = request.projection;
        self.brightness = request.params.brightness;
    }

    /// Parks a reload, returning the one it replaces.
    pub(crate) fn park_reload(&mut self, reload: PendingReload) -> Option<PendingReload> {
        self.pending_reload.replace(reload)
    }

    /// Takes the parked reload, leaving none.
    pub(crate) fn take_pending_reload(&mut self) -> Option<PendingReload> {
        self.pending_reload.take()
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }
}
