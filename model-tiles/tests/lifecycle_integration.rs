//! Integration tests for the model tile worker lifecycle.
//!
//! These tests drive the worker through scripted collaborators whose fetch
//! and decode completions are released by the test, covering:
//! - Fetch → parse → done with one bucket per rule family
//! - Empty payloads and transport errors
//! - Abort racing with fetch and decode
//! - Reloads of finished tiles and of tiles still loading
//!
//! Run with: `cargo test --test lifecycle_integration`

mod common;

use bytes::Bytes;
use futures::future::join_all;

use common::{
    families, glb, request, triangle_scene, wait_for, within, worker, GatedDecoder, GatedFetcher,
};
use model_tiles::decode::{EXT_MESHOPT_COMPRESSION, EXT_MESH_FEATURES};
use model_tiles::fetch::FetchError;
use model_tiles::{ReloadOutcome, TileError, TileOutcome, TileStatus};

// ============================================================================
// Load
// ============================================================================

/// A full load produces one bucket per rule family and a matching feature
/// index, then moves the record to the completed registry.
#[tokio::test]
async fn test_load_builds_one_bucket_per_family() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[EXT_MESHOPT_COMPRESSION], None));
    let worker = worker(fetcher.clone(), decoder.clone(), families(4));
    fetcher.respond("tiles/1.glb", Ok(glb()));

    let outcome = within(worker.load_tile(request(1, "tiles/1.glb")).unwrap())
        .await
        .unwrap();

    let payload = outcome.into_payload().expect("tile should load");
    assert_eq!(payload.buckets.len(), 4);
    assert_eq!(payload.feature_index.family_count(), 4);
    assert!(payload.feature_index.contains_rule("rule-3"));
    for bucket in &payload.buckets {
        assert!(bucket.capabilities().meshopt_compression);
        assert!(!bucket.capabilities().mesh_features);
        assert!(bucket.is_upload_ready());
        assert!(bucket.is_evaluated());
        assert_eq!(bucket.vertex_count(), 3);
    }

    assert_eq!(worker.status(1), Some(TileStatus::Done));
    assert!(worker.is_completed(1));
    assert_eq!(worker.in_flight_count(), 0);
    assert_eq!(decoder.calls(), 1);
}

/// Mesh feature assets keep upload deferred and get per-feature attributes.
#[tokio::test]
async fn test_mesh_features_defer_upload() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[EXT_MESH_FEATURES], Some(vec![1, 1, 2])));
    let worker = worker(fetcher.clone(), decoder, families(2));
    fetcher.respond("tiles/2.glb", Ok(glb()));

    let outcome = within(worker.load_tile(request(2, "tiles/2.glb")).unwrap())
        .await
        .unwrap();

    let payload = outcome.payload().expect("tile should load");
    for bucket in &payload.buckets {
        assert!(bucket.capabilities().mesh_features);
        assert!(!bucket.is_upload_ready());
        assert_eq!(bucket.feature_attributes().len(), 2);
    }
}

/// Zero bytes from the fetcher is an intentionally empty tile, not an error.
#[tokio::test]
async fn test_empty_payload_completes_without_parse() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder.clone(), families(1));
    fetcher.respond("tiles/7.glb", Ok(Bytes::new()));

    let outcome = within(worker.load_tile(request(7, "tiles/7.glb")).unwrap())
        .await
        .unwrap();

    assert!(matches!(outcome, TileOutcome::Empty));
    assert_eq!(worker.status(7), Some(TileStatus::Done));
    assert!(worker.is_completed(7));
    assert_eq!(decoder.calls(), 0);
}

#[tokio::test]
async fn test_transport_error_is_terminal() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder.clone(), families(1));
    fetcher.respond(
        "tiles/3.glb",
        Err(FetchError::Status {
            status: 503,
            url: "tiles/3.glb".to_string(),
        }),
    );

    let result = within(worker.load_tile(request(3, "tiles/3.glb")).unwrap()).await;

    match result {
        Err(TileError::Transport(FetchError::Status { status, .. })) => assert_eq!(status, 503),
        other => panic!("expected transport error, got {:?}", other),
    }
    assert_eq!(worker.status(3), Some(TileStatus::Done));
    assert_eq!(decoder.calls(), 0);
    assert_eq!(fetcher.calls("tiles/3.glb"), 1);
}

#[tokio::test]
async fn test_decode_error_is_terminal() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder, families(1));
    fetcher.respond("tiles/4.glb", Ok(Bytes::from_static(b"bad bytes")));

    let result = within(worker.load_tile(request(4, "tiles/4.glb")).unwrap()).await;

    assert!(matches!(result, Err(TileError::Decode(_))));
    assert!(worker.is_completed(4));
}

// ============================================================================
// Abort
// ============================================================================

/// Aborting before the fetch resolves: the late completion is recognised as
/// stale, nothing is parsed and nothing lands in the completed registry.
#[tokio::test]
async fn test_abort_before_fetch_resolves() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder.clone(), families(1));
    let gate = fetcher.gate("tiles/8.glb");

    let rx = worker.load_tile(request(8, "tiles/8.glb")).unwrap();
    wait_for(|| fetcher.calls("tiles/8.glb") == 1).await;
    worker.abort_tile(8);

    assert_eq!(worker.status(8), None);
    assert!(fetcher.was_cancelled("tiles/8.glb", 0));

    gate.send(Ok(glb())).unwrap();
    let outcome = within(rx).await.unwrap();

    assert!(outcome.is_aborted());
    assert!(!worker.is_completed(8));
    assert_eq!(worker.status(8), None);
    assert_eq!(decoder.calls(), 0);
}

/// A failed fetch still surfaces its error after an abort.
#[tokio::test]
async fn test_abort_then_fetch_error_reports_error() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder, families(1));
    let gate = fetcher.gate("tiles/8.glb");

    let rx = worker.load_tile(request(8, "tiles/8.glb")).unwrap();
    worker.abort_tile(8);
    gate.send(Err(FetchError::Request("reset by peer".to_string())))
        .unwrap();

    let result = within(rx).await;

    assert!(matches!(result, Err(TileError::Transport(_))));
    assert!(!worker.is_completed(8));
}

/// Aborting while the decoder runs discards the decoded scene.
#[tokio::test]
async fn test_abort_during_parse() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder.clone(), families(2));
    fetcher.respond("tiles/11.glb", Ok(glb()));
    let decode_gate = decoder.gate();

    let rx = worker.load_tile(request(11, "tiles/11.glb")).unwrap();
    wait_for(|| decoder.calls() == 1).await;
    assert_eq!(worker.status(11), Some(TileStatus::Parsing));

    worker.abort_tile(11);
    decode_gate.send(()).unwrap();
    let outcome = within(rx).await.unwrap();

    assert!(outcome.is_aborted());
    assert!(!worker.is_completed(11));
    assert_eq!(worker.metrics().loads_aborted, 1);
}

/// A stale completion from an aborted load never clobbers a newer load of
/// the same id.
#[tokio::test]
async fn test_stale_completion_does_not_touch_newer_load() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder, families(1));
    let first_gate = fetcher.gate("tiles/10.glb");
    let second_gate = fetcher.gate("tiles/10.glb");

    let first = worker.load_tile(request(10, "tiles/10.glb")).unwrap();
    wait_for(|| fetcher.calls("tiles/10.glb") == 1).await;
    worker.abort_tile(10);
    let second = worker.load_tile(request(10, "tiles/10.glb")).unwrap();
    wait_for(|| fetcher.calls("tiles/10.glb") == 2).await;

    second_gate.send(Ok(glb())).unwrap();
    let loaded = within(second).await.unwrap();
    assert!(loaded.payload().is_some());
    assert!(worker.is_completed(10));

    first_gate.send(Ok(Bytes::new())).unwrap();
    let stale = within(first).await.unwrap();

    assert!(stale.is_aborted());
    assert!(worker.is_completed(10));
    assert_eq!(worker.status(10), Some(TileStatus::Done));
    assert_eq!(worker.completed_count(), 1);
}

#[tokio::test]
async fn test_abort_and_remove_unknown_ids_are_noops() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher, decoder, families(1));

    worker.abort_tile(42);
    worker.remove_tile(42);
    worker.remove_tile(42);

    assert_eq!(worker.in_flight_count(), 0);
    assert_eq!(worker.completed_count(), 0);
}

#[tokio::test]
async fn test_remove_completed_tile() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder, families(1));
    fetcher.respond("tiles/12.glb", Ok(glb()));
    within(worker.load_tile(request(12, "tiles/12.glb")).unwrap())
        .await
        .unwrap();

    worker.remove_tile(12);

    assert!(!worker.is_completed(12));
    assert_eq!(worker.status(12), None);
}

// ============================================================================
// Reload
// ============================================================================

/// Reloading a finished tile discards the old record and runs a fresh cycle.
#[tokio::test]
async fn test_reload_done_tile_restarts() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder.clone(), families(1));
    fetcher.respond("tiles/9.glb", Ok(glb()));
    fetcher.respond("tiles/9.glb", Ok(glb()));
    within(worker.load_tile(request(9, "tiles/9.glb")).unwrap())
        .await
        .unwrap();

    let outcome = worker
        .reload_tile(request(9, "tiles/9.glb").with_brightness(0.3))
        .unwrap();

    assert!(outcome.is_restarted());
    let reloaded = within(outcome.into_receiver().unwrap()).await.unwrap();
    let payload = reloaded.payload().expect("reload should load");
    assert_eq!(payload.buckets[0].brightness(), 0.3);
    assert_eq!(fetcher.calls("tiles/9.glb"), 2);
    assert_eq!(decoder.calls(), 2);
    assert_eq!(worker.completed_count(), 1);
}

/// Reloading while parsing updates live parameters and defers the fresh
/// load until the current parse finishes.
#[tokio::test]
async fn test_reload_while_parsing_is_deferred() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder.clone(), families(1));
    fetcher.respond("tiles/5.glb", Ok(glb()));
    fetcher.respond("tiles/5.glb", Ok(glb()));
    let decode_gate = decoder.gate();

    let original = worker.load_tile(request(5, "tiles/5.glb")).unwrap();
    wait_for(|| decoder.calls() == 1).await;
    assert_eq!(worker.status(5), Some(TileStatus::Parsing));

    let outcome = worker
        .reload_tile(request(5, "tiles/5.glb").with_brightness(0.5))
        .unwrap();

    assert!(outcome.is_deferred());
    assert!(worker.has_pending_reload(5));
    assert_eq!(fetcher.calls("tiles/5.glb"), 1);

    decode_gate.send(()).unwrap();
    let first = within(original).await.unwrap();
    let payload = first.payload().expect("original load should finish");
    assert_eq!(payload.buckets[0].brightness(), 0.5);

    let second = within(outcome.into_receiver().unwrap()).await.unwrap();
    assert!(second.payload().is_some());
    assert_eq!(fetcher.calls("tiles/5.glb"), 2);
    assert!(worker.is_completed(5));

    let metrics = worker.metrics();
    assert_eq!(metrics.loads_started, 2);
    assert_eq!(metrics.loads_loaded, 2);
    assert_eq!(metrics.reloads_deferred, 1);
}

/// A reload parked while fetching resumes when the fetch comes back empty.
#[tokio::test]
async fn test_reload_parked_during_fetch_resumes_after_empty_fetch() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder.clone(), families(1));
    let gate = fetcher.gate("tiles/14.glb");
    fetcher.respond("tiles/14.glb", Ok(glb()));

    let original = worker.load_tile(request(14, "tiles/14.glb")).unwrap();
    wait_for(|| fetcher.calls("tiles/14.glb") == 1).await;
    assert_eq!(worker.status(14), Some(TileStatus::Fetching));
    let reload = worker.reload_tile(request(14, "tiles/14.glb")).unwrap();
    assert!(reload.is_deferred());

    gate.send(Ok(Bytes::new())).unwrap();

    assert!(within(original).await.unwrap().is_empty());
    let resumed = within(reload.into_receiver().unwrap()).await.unwrap();
    assert!(resumed.payload().is_some());
    assert_eq!(fetcher.calls("tiles/14.glb"), 2);
    assert_eq!(decoder.calls(), 1);
    assert!(worker.is_completed(14));
}

/// A reload parked while fetching resumes when the fetch fails.
#[tokio::test]
async fn test_reload_parked_during_fetch_resumes_after_fetch_error() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder, families(1));
    let gate = fetcher.gate("tiles/15.glb");
    fetcher.respond("tiles/15.glb", Ok(glb()));

    let original = worker.load_tile(request(15, "tiles/15.glb")).unwrap();
    let reload = worker.reload_tile(request(15, "tiles/15.glb")).unwrap();
    assert!(reload.is_deferred());

    gate.send(Err(FetchError::Timeout("tiles/15.glb".to_string())))
        .unwrap();

    let first = within(original).await;
    assert!(matches!(first, Err(TileError::Transport(FetchError::Timeout(_)))));
    let resumed = within(reload.into_receiver().unwrap()).await.unwrap();
    assert!(resumed.payload().is_some());
    assert_eq!(fetcher.calls("tiles/15.glb"), 2);
    assert_eq!(worker.status(15), Some(TileStatus::Done));
}

/// A newer reload replaces a parked one; only the newest resumes.
#[tokio::test]
async fn test_second_reload_supersedes_parked_one() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder, families(1));
    let gate = fetcher.gate("tiles/6.glb");
    fetcher.respond("tiles/6.glb", Ok(glb()));

    let original = worker.load_tile(request(6, "tiles/6.glb")).unwrap();
    let older = worker
        .reload_tile(request(6, "tiles/6.glb").with_brightness(0.2))
        .unwrap();
    let newer = worker
        .reload_tile(request(6, "tiles/6.glb").with_brightness(0.8))
        .unwrap();

    let superseded = within(older.into_receiver().unwrap()).await;
    assert!(matches!(superseded, Err(TileError::ReloadSuperseded(6))));

    gate.send(Ok(glb())).unwrap();
    assert!(within(original).await.unwrap().payload().is_some());

    let resumed = within(newer.into_receiver().unwrap()).await.unwrap();
    assert_eq!(resumed.payload().unwrap().buckets[0].brightness(), 0.8);
    assert_eq!(fetcher.calls("tiles/6.glb"), 2);
    assert_eq!(worker.metrics().reloads_superseded, 1);
}

/// Aborting a tile with a parked reload answers the reload with an error
/// and starts nothing new.
#[tokio::test]
async fn test_abort_cancels_parked_reload() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder, families(1));
    let gate = fetcher.gate("tiles/13.glb");

    let original = worker.load_tile(request(13, "tiles/13.glb")).unwrap();
    let reload = worker.reload_tile(request(13, "tiles/13.glb")).unwrap();
    worker.abort_tile(13);

    let cancelled = within(reload.into_receiver().unwrap()).await;
    assert!(matches!(cancelled, Err(TileError::ReloadCancelled(13))));

    gate.send(Ok(glb())).unwrap();
    assert!(within(original).await.unwrap().is_aborted());
    assert_eq!(worker.in_flight_count(), 0);
    assert!(!worker.is_completed(13));
}

#[tokio::test]
async fn test_reload_unknown_tile() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder, families(1));

    let outcome = worker.reload_tile(request(77, "tiles/77.glb")).unwrap();

    assert!(matches!(outcome, ReloadOutcome::NotFound));
    assert_eq!(fetcher.calls("tiles/77.glb"), 0);
}

// ============================================================================
// Worker
// ============================================================================

#[tokio::test]
async fn test_shutdown_aborts_in_flight_loads() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder, families(1));
    let gate_a = fetcher.gate("tiles/20.glb");
    let gate_b = fetcher.gate("tiles/21.glb");

    let a = worker.load_tile(request(20, "tiles/20.glb")).unwrap();
    let b = worker.load_tile(request(21, "tiles/21.glb")).unwrap();
    worker.shutdown();

    assert_eq!(worker.in_flight_count(), 0);
    gate_a.send(Ok(glb())).unwrap();
    gate_b.send(Ok(Bytes::new())).unwrap();

    assert!(within(a).await.unwrap().is_aborted());
    assert!(within(b).await.unwrap().is_aborted());
    assert_eq!(worker.completed_count(), 0);
}

/// Loads of different ids complete independently, in any order.
#[tokio::test]
async fn test_concurrent_loads_complete_independently() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder, families(1));
    let gates: Vec<_> = (0..8)
        .map(|i| fetcher.gate(&format!("tiles/{}.glb", 100 + i)))
        .collect();

    let receivers: Vec<_> = (0..8)
        .map(|i| {
            worker
                .load_tile(request(100 + i, &format!("tiles/{}.glb", 100 + i)))
                .unwrap()
        })
        .collect();
    assert_eq!(worker.in_flight_count(), 8);

    for gate in gates.into_iter().rev() {
        gate.send(Ok(glb())).unwrap();
    }
    let results = within(join_all(receivers)).await;

    assert!(results
        .iter()
        .all(|r| matches!(r, Ok(TileOutcome::Loaded(_)))));
    assert_eq!(worker.completed_count(), 8);
    assert_eq!(worker.in_flight_count(), 0);
}

/// After shutdown nothing new is registered or fetched.
#[tokio::test]
async fn test_shutdown_refuses_new_loads() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder, families(1));
    fetcher.respond("tiles/22.glb", Ok(glb()));
    within(worker.load_tile(request(22, "tiles/22.glb")).unwrap())
        .await
        .unwrap();

    worker.shutdown();

    let load = worker.load_tile(request(23, "tiles/23.glb"));
    assert!(matches!(load, Err(TileError::WorkerShutdown)));
    let reload = worker.reload_tile(request(22, "tiles/22.glb"));
    assert!(matches!(reload, Err(TileError::WorkerShutdown)));

    tokio::task::yield_now().await;
    assert_eq!(fetcher.calls("tiles/23.glb"), 0);
    assert_eq!(fetcher.calls("tiles/22.glb"), 1);
    assert_eq!(worker.status(23), None);
    assert!(worker.is_completed(22));
    assert_eq!(worker.in_flight_count(), 0);
    assert_eq!(worker.metrics().loads_started, 1);
}

#[tokio::test]
async fn test_metrics_track_outcomes() {
    let fetcher = GatedFetcher::new();
    let decoder = GatedDecoder::new(triangle_scene(&[], None));
    let worker = worker(fetcher.clone(), decoder, families(3));
    fetcher.respond("tiles/30.glb", Ok(glb()));
    fetcher.respond("tiles/31.glb", Ok(Bytes::new()));

    within(worker.load_tile(request(30, "tiles/30.glb")).unwrap())
        .await
        .unwrap();
    within(worker.load_tile(request(31, "tiles/31.glb")).unwrap())
        .await
        .unwrap();
    let _ = within(worker.load_tile(request(32, "tiles/32.glb")).unwrap()).await;

    let metrics = worker.metrics();
    assert_eq!(metrics.loads_started, 3);
    assert_eq!(metrics.loads_loaded, 1);
    assert_eq!(metrics.loads_empty, 1);
    assert_eq!(metrics.loads_failed, 1);
    assert_eq!(metrics.buckets_built, 3);
    assert_eq!(metrics.loads_pending(), 0);
}
