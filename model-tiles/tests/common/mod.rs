//! Scriptable collaborators for worker integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use model_tiles::decode::{DecodeError, DecodedScene, MeshPrimitive, SceneDecoder, SceneNode};
use model_tiles::fetch::{BoxFuture, FetchError, TileFetcher};
use model_tiles::style::{ConstantRule, RuleFamily, StaticRuleIndex};
use model_tiles::{ModelTileWorker, TileCoord, TileId, TileRequest, WorkerConfig};

pub type FetchGate = oneshot::Sender<Result<Bytes, FetchError>>;

// ============================================================================
// Fetcher
// ============================================================================

/// Fetcher whose completions are released by the test.
///
/// Each locator has a FIFO of pending responses; every fetch takes the next
/// one. A fetch with nothing queued fails with HTTP 404. Cancellation tokens
/// are recorded but not honoured, like a transport that cannot be
/// interrupted.
#[derive(Default)]
pub struct GatedFetcher {
    queues: Mutex<HashMap<String, VecDeque<oneshot::Receiver<Result<Bytes, FetchError>>>>>,
    tokens: Mutex<HashMap<String, Vec<CancellationToken>>>,
}

impl GatedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a response for `locator` that completes when the gate is sent.
    pub fn gate(&self, locator: &str) -> FetchGate {
        let (tx, rx) = oneshot::channel();
        self.queues
            .lock()
            .entry(locator.to_string())
            .or_default()
            .push_back(rx);
        tx
    }

    /// Queues a response for `locator` that completes immediately.
    pub fn respond(&self, locator: &str, result: Result<Bytes, FetchError>) {
        let _ = self.gate(locator).send(result);
    }

    /// Number of fetches issued for `locator`.
    pub fn calls(&self, locator: &str) -> usize {
        self.tokens.lock().get(locator).map_or(0, Vec::len)
    }

    /// Returns true if the nth fetch for `locator` saw its token cancelled.
    pub fn was_cancelled(&self, locator: &str, nth: usize) -> bool {
        self.tokens
            .lock()
            .get(locator)
            .and_then(|tokens| tokens.get(nth))
            .is_some_and(CancellationToken::is_cancelled)
    }
}

impl TileFetcher for GatedFetcher {
    fn fetch(
        &self,
        locator: &str,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<Bytes, FetchError>> {
        self.tokens
            .lock()
            .entry(locator.to_string())
            .or_default()
            .push(cancel);
        let gate = self
            .queues
            .lock()
            .get_mut(locator)
            .and_then(VecDeque::pop_front);
        let url = locator.to_string();

        Box::pin(async move {
            match gate {
                Some(rx) => rx.await.unwrap_or(Err(FetchError::Cancelled)),
                None => Err(FetchError::Status { status: 404, url }),
            }
        })
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Decoder returning a fixed scene, optionally held at a gate.
///
/// Gates are consumed in call order; calls beyond the queued gates finish
/// immediately.
pub struct GatedDecoder {
    scene: DecodedScene,
    gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    calls: AtomicUsize,
}

impl GatedDecoder {
    pub fn new(scene: DecodedScene) -> Arc<Self> {
        Arc::new(Self {
            scene,
            gates: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Holds the next decode until the returned sender fires.
    pub fn gate(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().push_back(rx);
        tx
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SceneDecoder for GatedDecoder {
    fn decode(&self, bytes: Bytes) -> BoxFuture<'_, Result<DecodedScene, DecodeError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().pop_front();
        let scene = self.scene.clone();

        Box::pin(async move {
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            if bytes.starts_with(b"bad") {
                return Err(DecodeError::Malformed("unexpected magic".to_string()));
            }
            Ok(scene)
        })
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const SOURCE_LAYER: &str = "buildings";

/// A one-node scene with a single triangle.
pub fn triangle_scene(extensions: &[&str], feature_ids: Option<Vec<u32>>) -> DecodedScene {
    DecodedScene {
        extensions_used: extensions.iter().map(|s| s.to_string()).collect(),
        nodes: vec![SceneNode {
            name: Some("landmark".to_string()),
            translation: [10.0, 20.0, 0.0],
            meshes: vec![MeshPrimitive {
                positions: vec![[0.0, 0.0, 0.0], [4.0, 0.0, 0.0], [0.0, 4.0, 30.0]],
                indices: vec![0, 1, 2],
                feature_ids,
            }],
            children: vec![],
        }],
    }
}

/// Rule index with `n` single-rule families on [`SOURCE_LAYER`].
pub fn families(n: usize) -> StaticRuleIndex {
    (0..n).fold(StaticRuleIndex::new(), |index, i| {
        index.with_family(
            SOURCE_LAYER,
            RuleFamily::new(Arc::new(ConstantRule::new(format!("rule-{i}")))),
        )
    })
}

pub fn worker(
    fetcher: Arc<GatedFetcher>,
    decoder: Arc<GatedDecoder>,
    rules: StaticRuleIndex,
) -> ModelTileWorker {
    ModelTileWorker::builder(fetcher, decoder, Arc::new(rules))
        .config(WorkerConfig::default().with_max_concurrent_decodes(2))
        .build()
        .expect("worker builds inside a runtime")
}

pub fn request(id: TileId, locator: &str) -> TileRequest {
    TileRequest::new(id, TileCoord::new(14, 8192, 5461), locator).with_source("landmarks", SOURCE_LAYER)
}

pub fn glb() -> Bytes {
    Bytes::from_static(b"glTF\x02\x00\x00\x00")
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    let polled = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), polled)
        .await
        .expect("condition not reached within 5s");
}

/// Awaits `future`, failing the test after five seconds.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("future did not resolve within 5s")
}
