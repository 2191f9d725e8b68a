//! Completion handles returned by the worker.
//!
//! Every accepted load yields one [`TileReceiver`] that resolves exactly
//! once. The sending half is consumed by whichever code path finishes the
//! load, so a caller can never observe two results.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::TileError;
use crate::parse::TilePayload;
use crate::tile::TileId;

/// Successful terminal outcomes of a load.
#[derive(Debug)]
pub enum TileOutcome {
    /// The tile parsed into a payload.
    Loaded(Box<TilePayload>),
    /// The fetch returned zero bytes; the tile is intentionally empty.
    Empty,
    /// The load was aborted before it finished. No payload is delivered.
    Aborted,
}

impl TileOutcome {
    /// The payload, if the tile loaded.
    pub fn payload(&self) -> Option<&TilePayload> {
        match self {
            Self::Loaded(payload) => Some(payload),
            _ => None,
        }
    }

    /// Consumes the outcome, returning the payload if the tile loaded.
    pub fn into_payload(self) -> Option<TilePayload> {
        match self {
            Self::Loaded(payload) => Some(*payload),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Terminal result delivered for one load.
pub type TileResult = Result<TileOutcome, TileError>;

/// Single-use completion handle for one load.
///
/// Resolves to `Err(TileError::WorkerShutdown)` if the worker drops the load
/// without answering.
#[derive(Debug)]
pub struct TileReceiver {
    id: TileId,
    rx: oneshot::Receiver<TileResult>,
}

impl TileReceiver {
    pub(crate) fn new(id: TileId, rx: oneshot::Receiver<TileResult>) -> Self {
        Self { id, rx }
    }

    /// Identifier of the tile this handle belongs to.
    pub fn id(&self) -> TileId {
        self.id
    }

    /// Returns the result if it has already been delivered.
    pub fn try_result(&mut self) -> Option<TileResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TileError::WorkerShutdown)),
        }
    }
}

impl Future for TileReceiver {
    type Output = TileResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TileError::WorkerShutdown)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Creates a linked sender and receiver for `id`.
pub(crate) fn completion(id: TileId) -> (oneshot::Sender<TileResult>, TileReceiver) {
    let (tx, rx) = oneshot::channel();
    (tx, TileReceiver::new(id, rx))
}

/// What a reload request turned into.
#[derive(Debug)]
pub enum ReloadOutcome {
    /// The tile was done; a fresh load started.
    Restarted(TileReceiver),
    /// The tile is still loading; the reload runs once it finishes.
    Deferred(TileReceiver),
    /// Nothing to reload.
    NotFound,
}

impl ReloadOutcome {
    /// The completion handle, if a load was started or scheduled.
    pub fn into_receiver(self) -> Option<TileReceiver> {
        match self {
            Self::Restarted(rx) | Self::Deferred(rx) => Some(rx),
            Self::NotFound => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    pub fn is_restarted(&self) -> bool {
        matches!(self, Self::Restarted(_))
    }
}
