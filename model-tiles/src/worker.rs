//! Model tile worker: the tile request lifecycle manager.
//!
//! The [`ModelTileWorker`] accepts load, reload, abort and remove requests
//! from the rendering layer, runs fetch and decode on the Tokio runtime, and
//! delivers exactly one terminal result per accepted load.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        ModelTileWorker                           │
//! │                                                                  │
//! │  load_tile ──► register (Fetching) ──► TileFetcher               │
//! │                                             │                    │
//! │                              liveness check ◄┘                   │
//! │                 ┌──────────────┬────────────┴──────┐             │
//! │              aborted      error / empty        bytes             │
//! │                 │              │                  │              │
//! │                 │          complete (Done)   Parsing ──► decode  │
//! │                 │              │                  liveness check │
//! │                 │              │                  build buckets  │
//! │                 │              │                  complete (Done)│
//! │                 ▼              ▼                  ▼              │
//! │              deliver ◄─────────┴──────────────────┘              │
//! │                 │                                                │
//! │                 └──► resume parked reload (fresh load)           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Concurrency
//!
//! Registry state sits behind one mutex. Each transition between suspension
//! points (fetch, decode permit, decode) takes the lock once, so transitions
//! are atomic relative to every other operation. Cancellation is advisory:
//! aborting removes the record and trips its cancellation token, but work
//! already handed to a collaborator runs on; its completion is recognised
//! as stale by the generation-checked liveness test.
//!
//! # Reloads
//!
//! A reload of a finished tile starts a fresh load. A reload of a tile that
//! is still loading updates its live parameters and parks the reload on the
//! record. When the current load finishes, its result goes to the original
//! caller and the parked reload starts a fresh load whose result goes to the
//! reload caller. Each handle is answered once.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::decode::SceneDecoder;
use crate::error::TileError;
use crate::feature_index::{DefaultFeatureIndexFactory, FeatureIndexFactory};
use crate::fetch::{FetchError, TileFetcher};
use crate::handle::{completion, ReloadOutcome, TileOutcome, TileReceiver, TileResult};
use crate::parse::{decode_scene, ParsePipeline};
use crate::registry::{Liveness, TileRegistry};
use crate::style::StyleRuleIndex;
use crate::telemetry::{MetricsSnapshot, WorkerMetrics};
use crate::tile::{PendingReload, TileId, TileRecord, TileRequest, TileStatus};

type TileSender = oneshot::Sender<TileResult>;

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`ModelTileWorker`].
pub struct WorkerBuilder {
    fetcher: Arc<dyn TileFetcher>,
    decoder: Arc<dyn SceneDecoder>,
    rules: Arc<dyn StyleRuleIndex>,
    feature_indexes: Arc<dyn FeatureIndexFactory>,
    config: WorkerConfig,
    runtime: Option<Handle>,
}

impl WorkerBuilder {
    /// Sets the worker configuration.
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the factory used to create feature indexes.
    pub fn feature_index_factory(mut self, factory: Arc<dyn FeatureIndexFactory>) -> Self {
        self.feature_indexes = factory;
        self
    }

    /// Runs loads on `runtime` instead of the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builds the worker.
    ///
    /// # Errors
    ///
    /// `TileError::NoRuntime` if no runtime was given and the caller is not
    /// inside a Tokio runtime.
    pub fn build(self) -> Result<ModelTileWorker, TileError> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| TileError::NoRuntime)?,
        };
        let decode_permits = self.config.max_concurrent_decodes.max(1);

        info!(
            tile_extent = self.config.tile_extent,
            decode_permits, "Model tile worker started"
        );

        Ok(ModelTileWorker {
            inner: Arc::new(WorkerInner {
                registry: Mutex::new(TileRegistry::new()),
                fetcher: self.fetcher,
                decoder: self.decoder,
                rules: self.rules,
                feature_indexes: self.feature_indexes,
                decode_limiter: Semaphore::new(decode_permits),
                config: self.config,
                metrics: Arc::new(WorkerMetrics::new()),
                runtime,
            }),
        })
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Lifecycle manager for model tile loads.
///
/// Cheap to clone; clones share the same registries.
#[derive(Clone)]
pub struct ModelTileWorker {
    inner: Arc<WorkerInner>,
}

impl ModelTileWorker {
    /// Starts building a worker over the given collaborators.
    pub fn builder(
        fetcher: Arc<dyn TileFetcher>,
        decoder: Arc<dyn SceneDecoder>,
        rules: Arc<dyn StyleRuleIndex>,
    ) -> WorkerBuilder {
        WorkerBuilder {
            fetcher,
            decoder,
            rules,
            feature_indexes: Arc::new(DefaultFeatureIndexFactory),
            config: WorkerConfig::default(),
            runtime: None,
        }
    }

    /// Starts loading a tile.
    ///
    /// Returns immediately with a handle that resolves once the load reaches
    /// a terminal outcome.
    ///
    /// # Errors
    ///
    /// - `TileError::InvalidCoord` if the coordinate is outside the grid
    /// - `TileError::DuplicateRequest` if the id is already loading
    /// - `TileError::WorkerShutdown` after [`shutdown`](Self::shutdown)
    pub fn load_tile(&self, request: TileRequest) -> Result<TileReceiver, TileError> {
        request.coord.validate()?;
        let (tx, rx) = completion(request.id);

        let start = {
            let mut registry = self.inner.registry.lock();
            self.inner.begin_load(&mut registry, request)?
        };
        self.inner.spawn_load(start, tx);

        Ok(rx)
    }

    /// Reloads a tile with new parameters.
    ///
    /// - Finished tile: the stale record is dropped and a fresh load starts.
    /// - Tile still loading: projection and brightness are updated in place
    ///   and the reload is parked until the current load finishes. A reload
    ///   already parked is answered with `TileError::ReloadSuperseded`.
    /// - Unknown tile: nothing happens.
    ///
    /// After [`shutdown`](Self::shutdown) a finished tile is left as is and
    /// the reload fails with `TileError::WorkerShutdown`.
    pub fn reload_tile(&self, request: TileRequest) -> Result<ReloadOutcome, TileError> {
        request.coord.validate()?;
        let id = request.id;
        let mut registry = self.inner.registry.lock();

        if registry.lookup_completed(id).is_some() {
            // Registering the fresh load evicts the finished record
            let start = self.inner.begin_load(&mut registry, request)?;
            drop(registry);

            let (tx, rx) = completion(id);
            self.inner.metrics.reload_restarted();
            debug!(tile_id = id, "Reload restarted finished tile");
            self.inner.spawn_load(start, tx);
            return Ok(ReloadOutcome::Restarted(rx));
        }

        let parked = match registry.in_flight_latest_mut(id) {
            Some(record) => {
                record.apply_reload_parameters(&request);
                let (tx, rx) = completion(id);
                let replaced = record.park_reload(PendingReload {
                    request,
                    sender: tx,
                });
                Some((rx, record.status(), replaced))
            }
            None => None,
        };
        drop(registry);

        match parked {
            Some((rx, status, replaced)) => {
                self.inner.metrics.reload_deferred();
                debug!(tile_id = id, ?status, "Reload parked until current load finishes");
                if let Some(previous) = replaced {
                    self.inner.metrics.reload_superseded();
                    debug!(tile_id = id, "Parked reload superseded");
                    answer(id, previous.sender, Err(TileError::ReloadSuperseded(id)));
                }
                Ok(ReloadOutcome::Deferred(rx))
            }
            None => {
                debug!(tile_id = id, "Nothing to reload");
                Ok(ReloadOutcome::NotFound)
            }
        }
    }

    /// Aborts an in-flight load. Idempotent.
    ///
    /// The completed registry is untouched. Collaborator work keeps running;
    /// its completion is recognised as stale and delivers
    /// `TileOutcome::Aborted` (or the fetch error, if the fetch failed).
    pub fn abort_tile(&self, id: TileId) {
        let record = self.inner.registry.lock().abort(id);
        if let Some(record) = record {
            debug!(tile_id = id, generation = record.generation(), "Aborted tile");
            self.inner.drop_record(record);
        }
    }

    /// Removes a finished tile. Idempotent.
    pub fn remove_tile(&self, id: TileId) {
        if self.inner.registry.lock().remove(id).is_some() {
            debug!(tile_id = id, "Removed tile");
        }
    }

    /// Aborts every in-flight load and stops admitting decodes.
    pub fn shutdown(&self) {
        self.inner.decode_limiter.close();
        let records = self.inner.registry.lock().drain_in_flight();
        info!(aborted = records.len(), "Model tile worker shutting down");
        for record in records {
            self.inner.drop_record(record);
        }
    }

    /// Status of the record currently held for `id`.
    pub fn status(&self, id: TileId) -> Option<TileStatus> {
        self.inner.registry.lock().status(id)
    }

    /// Returns true if a parked reload is waiting on `id`.
    pub fn has_pending_reload(&self, id: TileId) -> bool {
        self.inner
            .registry
            .lock()
            .in_flight(id)
            .is_some_and(|r| r.has_pending_reload())
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.registry.lock().in_flight_count()
    }

    pub fn completed_count(&self) -> usize {
        self.inner.registry.lock().completed_count()
    }

    pub fn is_completed(&self, id: TileId) -> bool {
        self.inner.registry.lock().lookup_completed(id).is_some()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }
}

// =============================================================================
// Internals
// =============================================================================

struct WorkerInner {
    registry: Mutex<TileRegistry>,
    fetcher: Arc<dyn TileFetcher>,
    decoder: Arc<dyn SceneDecoder>,
    rules: Arc<dyn StyleRuleIndex>,
    feature_indexes: Arc<dyn FeatureIndexFactory>,
    decode_limiter: Semaphore,
    config: WorkerConfig,
    metrics: Arc<WorkerMetrics>,
    runtime: Handle,
}

/// A registered load waiting to be spawned.
struct LoadStart {
    request: TileRequest,
    generation: u64,
    cancel: CancellationToken,
}

/// What to do with a parked reload once the current load is done.
///
/// Either a fresh load is started for the reload caller, or the reload
/// caller is answered with an error. Never both.
enum Continuation {
    Start(LoadStart, TileSender),
    Fail(TileError, TileSender),
}

/// Terminal result of one load plus any resumed reload.
struct Finish {
    result: TileResult,
    continuation: Option<Continuation>,
}

impl Finish {
    fn aborted(result: TileResult) -> Self {
        Self {
            result,
            continuation: None,
        }
    }
}

/// Next step after the fetch resumption point.
enum FetchStep {
    Parse(Bytes),
    Finish(Finish),
}

impl WorkerInner {
    /// Creates and registers a `Fetching` record for `request`.
    ///
    /// Refused once the worker is shut down, so nothing new is fetched.
    fn begin_load(
        &self,
        registry: &mut TileRegistry,
        request: TileRequest,
    ) -> Result<LoadStart, TileError> {
        if self.decode_limiter.is_closed() {
            debug!(tile_id = request.id, "Load refused after shutdown");
            return Err(TileError::WorkerShutdown);
        }
        let generation = registry.next_generation();
        let record = TileRecord::new(&request, generation);
        let cancel = record.cancel_token();

        if let Some(evicted) = registry.register(record)? {
            debug!(
                tile_id = request.id,
                superseded = evicted.generation(),
                "New load supersedes finished tile"
            );
        }
        self.metrics.load_started();
        debug!(
            tile_id = request.id,
            generation,
            coord = %request.coord,
            source = %request.source_id,
            "Tile load registered"
        );

        Ok(LoadStart {
            request,
            generation,
            cancel,
        })
    }

    fn spawn_load(self: &Arc<Self>, start: LoadStart, sender: TileSender) {
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            inner.run_load(start, sender).await;
        });
    }

    async fn run_load(self: Arc<Self>, start: LoadStart, sender: TileSender) {
        let LoadStart {
            request,
            generation,
            cancel,
        } = start;

        let fetched = self.fetcher.fetch(&request.locator, cancel).await;

        let finish = match self.after_fetch(&request, generation, fetched) {
            FetchStep::Finish(finish) => finish,
            FetchStep::Parse(bytes) => self.parse(&request, generation, bytes).await,
        };

        self.deliver(request.id, finish, sender);
    }

    /// Handles the fetch completion under the registry lock.
    fn after_fetch(
        &self,
        request: &TileRequest,
        generation: u64,
        fetched: Result<Bytes, FetchError>,
    ) -> FetchStep {
        let id = request.id;
        let mut registry = self.registry.lock();

        if registry.liveness(id, generation) != Liveness::Active {
            drop(registry);
            self.metrics.load_aborted();
            return FetchStep::Finish(Finish::aborted(match fetched {
                Err(e) => {
                    // Surface the transport failure even though the tile is stale
                    warn!(tile_id = id, generation, error = %e, "Fetch failed for aborted tile");
                    Err(TileError::Transport(e))
                }
                Ok(_) => {
                    debug!(tile_id = id, generation, "Fetch finished for aborted tile");
                    Ok(TileOutcome::Aborted)
                }
            }));
        }

        match fetched {
            Err(e) => {
                let continuation = self.complete_locked(&mut registry, id, generation);
                drop(registry);
                self.metrics.load_failed();
                warn!(tile_id = id, coord = %request.coord, error = %e, "Tile fetch failed");
                FetchStep::Finish(Finish {
                    result: Err(TileError::Transport(e)),
                    continuation,
                })
            }
            Ok(bytes) if bytes.is_empty() => {
                let continuation = self.complete_locked(&mut registry, id, generation);
                drop(registry);
                self.metrics.load_empty();
                debug!(tile_id = id, coord = %request.coord, "Tile is empty");
                FetchStep::Finish(Finish {
                    result: Ok(TileOutcome::Empty),
                    continuation,
                })
            }
            Ok(bytes) => {
                if let Some(record) = registry.in_flight_mut(id, generation) {
                    record.set_status(TileStatus::Parsing);
                }
                debug!(tile_id = id, generation, bytes = bytes.len(), "Tile parsing");
                FetchStep::Parse(bytes)
            }
        }
    }

    /// Decodes and builds buckets, checking liveness after each suspension.
    async fn parse(&self, request: &TileRequest, generation: u64, bytes: Bytes) -> Finish {
        let id = request.id;

        let decoded = decode_scene(self.decoder.as_ref(), &self.decode_limiter, bytes).await;

        // Live brightness: a reload may have changed it while decoding
        let brightness = self
            .registry
            .lock()
            .in_flight(id)
            .filter(|r| r.generation() == generation)
            .map(|r| r.brightness());
        let Some(brightness) = brightness else {
            self.metrics.load_aborted();
            debug!(tile_id = id, generation, "Decode finished for aborted tile");
            return Finish::aborted(Ok(TileOutcome::Aborted));
        };

        let result = decoded.and_then(|scene| {
            ParsePipeline::new(
                self.rules.as_ref(),
                self.feature_indexes.as_ref(),
                self.config.tile_extent,
                self.config.promote_id.clone(),
            )
            .build(&scene, request, brightness)
        });

        let mut registry = self.registry.lock();
        if registry.liveness(id, generation) != Liveness::Active {
            drop(registry);
            self.metrics.load_aborted();
            debug!(tile_id = id, generation, "Parse finished for aborted tile");
            return Finish::aborted(Ok(TileOutcome::Aborted));
        }
        let continuation = self.complete_locked(&mut registry, id, generation);
        drop(registry);

        let result = match result {
            Ok(payload) => {
                self.metrics.load_loaded(payload.buckets.len());
                info!(
                    tile_id = id,
                    coord = %request.coord,
                    buckets = payload.buckets.len(),
                    "Tile loaded"
                );
                Ok(TileOutcome::Loaded(Box::new(payload)))
            }
            Err(e) => {
                self.metrics.load_failed();
                warn!(tile_id = id, coord = %request.coord, error = %e, "Tile parse failed");
                Err(e)
            }
        };

        Finish {
            result,
            continuation,
        }
    }

    /// Moves the record to the completed registry and resumes any parked
    /// reload. Must be called with the registry locked.
    fn complete_locked(
        &self,
        registry: &mut TileRegistry,
        id: TileId,
        generation: u64,
    ) -> Option<Continuation> {
        let mut record = registry.unregister(id, generation)?;
        record.set_status(TileStatus::Done);
        let pending = record.take_pending_reload();
        registry.complete(record);

        let pending = pending?;
        debug!(tile_id = id, "Resuming parked reload");
        Some(match self.begin_load(registry, pending.request) {
            Ok(start) => Continuation::Start(start, pending.sender),
            Err(e) => Continuation::Fail(e, pending.sender),
        })
    }

    /// Releases an aborted record: trips its token and answers a parked reload.
    fn drop_record(&self, mut record: TileRecord) {
        record.cancel();
        if let Some(pending) = record.take_pending_reload() {
            let id = record.id();
            self.metrics.reload_cancelled();
            debug!(tile_id = id, "Parked reload cancelled by abort");
            answer(id, pending.sender, Err(TileError::ReloadCancelled(id)));
        }
    }

    /// Answers the load's own handle, then hands off to the parked reload.
    fn deliver(self: &Arc<Self>, id: TileId, finish: Finish, sender: TileSender) {
        answer(id, sender, finish.result);

        match finish.continuation {
            Some(Continuation::Start(start, tx)) => self.spawn_load(start, tx),
            Some(Continuation::Fail(e, tx)) => {
                warn!(tile_id = id, error = %e, "Parked reload could not start");
                answer(id, tx, Err(e));
            }
            None => {}
        }
    }
}

fn answer(id: TileId, sender: TileSender, result: TileResult) {
    if sender.send(result).is_err() {
        debug!(tile_id = id, "Completion handle dropped before delivery");
    }
}
