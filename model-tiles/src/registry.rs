//! Request registry: in-flight and completed tile records.
//!
//! Two maps keyed by [`TileId`]. An id is in at most one of them at any
//! instant. Records carry a generation stamp so that a completion from an
//! aborted load can never be mistaken for a newer load of the same id.
//!
//! # State Machine
//!
//! ```text
//!   register ──► in_flight ──unregister──► (caller) ──complete──► completed
//!                    │                                               │
//!                  abort                                           remove
//!                    ▼                                               ▼
//!                 dropped                                         dropped
//! ```

use std::collections::HashMap;

use tracing::warn;

use crate::error::TileError;
use crate::tile::{TileId, TileRecord, TileStatus};

/// Result of checking a load after a suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The load's record is still in flight.
    Active,
    /// The record was aborted or superseded while suspended.
    Aborted,
    /// The record already reached the completed registry.
    Completed,
}

/// Arena of tile records for one worker.
#[derive(Debug, Default)]
pub struct TileRegistry {
    in_flight: HashMap<TileId, TileRecord>,
    completed: HashMap<TileId, TileRecord>,
    next_generation: u64,
}

impl TileRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a generation stamp for a new record.
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Inserts `record` into the in-flight set.
    ///
    /// Any completed record for the same id is evicted and returned; the new
    /// load supersedes it.
    ///
    /// # Errors
    ///
    /// `TileError::DuplicateRequest` if the id is already in flight.
    pub fn register(&mut self, record: TileRecord) -> Result<Option<TileRecord>, TileError> {
        let id = record.id();
        if self.in_flight.contains_key(&id) {
            return Err(TileError::DuplicateRequest(id));
        }
        let evicted = self.completed.remove(&id);
        self.in_flight.insert(id, record);
        Ok(evicted)
    }

    /// Removes the in-flight record for `id` if it belongs to `generation`.
    ///
    /// Returns `None` when the load was aborted in the interim.
    pub fn unregister(&mut self, id: TileId, generation: u64) -> Option<TileRecord> {
        match self.in_flight.get(&id) {
            Some(record) if record.generation() == generation => self.in_flight.remove(&id),
            _ => None,
        }
    }

    /// Moves `record` into the completed set, replacing any prior record.
    pub fn complete(&mut self, record: TileRecord) -> Option<TileRecord> {
        let id = record.id();
        if self.in_flight.contains_key(&id) {
            // Callers unregister first; a newer load owns the id now.
            warn!(tile_id = id, "Dropping completion for tile that is loading again");
            return None;
        }
        self.completed.insert(id, record)
    }

    /// Deletes the completed record for `id`. No-op if absent.
    pub fn remove(&mut self, id: TileId) -> Option<TileRecord> {
        self.completed.remove(&id)
    }

    /// Removes the in-flight record for `id`, whatever its generation.
    pub fn abort(&mut self, id: TileId) -> Option<TileRecord> {
        self.in_flight.remove(&id)
    }

    pub fn lookup_completed(&self, id: TileId) -> Option<&TileRecord> {
        self.completed.get(&id)
    }

    pub fn in_flight(&self, id: TileId) -> Option<&TileRecord> {
        self.in_flight.get(&id)
    }

    /// Mutable access to an in-flight record, checked against `generation`.
    pub fn in_flight_mut(&mut self, id: TileId, generation: u64) -> Option<&mut TileRecord> {
        self.in_flight
            .get_mut(&id)
            .filter(|record| record.generation() == generation)
    }

    /// Mutable access to the in-flight record for `id`, any generation.
    pub fn in_flight_latest_mut(&mut self, id: TileId) -> Option<&mut TileRecord> {
        self.in_flight.get_mut(&id)
    }

    /// Classifies the load `(id, generation)` after a suspension point.
    pub fn liveness(&self, id: TileId, generation: u64) -> Liveness {
        if self
            .in_flight
            .get(&id)
            .is_some_and(|r| r.generation() == generation)
        {
            Liveness::Active
        } else if self
            .completed
            .get(&id)
            .is_some_and(|r| r.generation() == generation)
        {
            Liveness::Completed
        } else {
            Liveness::Aborted
        }
    }

    /// Status of whichever record currently holds `id`.
    pub fn status(&self, id: TileId) -> Option<TileStatus> {
        self.in_flight
            .get(&id)
            .or_else(|| self.completed.get(&id))
            .map(|r| r.status())
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Drains every in-flight record.
    pub fn drain_in_flight(&mut self) -> Vec<TileRecord> {
        self.in_flight.drain().map(|(_, record)| record).collect()
    }
}
