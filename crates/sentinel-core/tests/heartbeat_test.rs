//! Integration tests for the heartbeat scheduler.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{engine_with, gateway, person, RecordingChannel, ScriptedDetector};
use sentinel_core::config::{DetectionConfig, HeartbeatConfig};
use sentinel_core::memory::{MemoryStore, SqliteMemoryStore};
use sentinel_core::types::DetectionSample;
use sentinel_core::{ConversationEngine, HeartbeatScheduler, SentinelError, SentinelResult, TickOutcome};
use tokio_util::sync::CancellationToken;

fn heartbeat_config(interval_secs: u64, detector_timeout_secs: u64) -> HeartbeatConfig {
    HeartbeatConfig {
        interval_secs,
        detector_timeout_secs,
    }
}

fn engine(store: Arc<dyn MemoryStore>, channel: Arc<RecordingChannel>) -> Arc<ConversationEngine> {
    Arc::new(engine_with(store, gateway(vec![]), channel))
}

fn scheduler(
    detector: Arc<ScriptedDetector>,
    engine: Arc<ConversationEngine>,
    config: HeartbeatConfig,
) -> HeartbeatScheduler {
    HeartbeatScheduler::new(&config, &DetectionConfig::default(), detector, engine)
}

fn empty_frames(n: usize) -> Vec<SentinelResult<DetectionSample>> {
    (0..n).map(|_| Ok(DetectionSample::new(0.0, "none"))).collect()
}

#[tokio::test]
async fn test_three_positive_frames_start_session() {
    let store: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::in_memory().unwrap());
    let channel = RecordingChannel::new();
    let engine = engine(store.clone(), channel.clone());
    let detector = ScriptedDetector::new(vec![person(0.9), person(0.91), person(0.92), person(0.93)]);
    let mut heartbeat = scheduler(detector, engine.clone(), heartbeat_config(60, 30));

    assert_eq!(heartbeat.tick().await, TickOutcome::Observed { positive_frames: 1 });
    assert_eq!(heartbeat.tick().await, TickOutcome::Observed { positive_frames: 2 });
    let TickOutcome::Triggered { session_id } = heartbeat.tick().await else {
        panic!("expected a trigger on the third frame");
    };

    // Presence stays high: no second trigger.
    assert!(matches!(heartbeat.tick().await, TickOutcome::Observed { .. }));

    let active = engine.active_session().await.unwrap();
    assert_eq!(active.session_id, session_id);
    assert_eq!(channel.questions.lock().unwrap().len(), 1);

    let presence = store.recent_presence(10).unwrap();
    assert_eq!(presence.len(), 1);
    assert!(presence[0].triggered);
}

#[tokio::test]
async fn test_low_confidence_frame_resets_window() {
    let store: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::in_memory().unwrap());
    let engine = engine(store, RecordingChannel::new());
    let detector = ScriptedDetector::new(vec![
        person(0.9),
        person(0.9),
        person(0.5),
        person(0.9),
        person(0.9),
    ]);
    let mut heartbeat = scheduler(detector, engine.clone(), heartbeat_config(60, 30));

    for _ in 0..5 {
        assert!(matches!(heartbeat.tick().await, TickOutcome::Observed { .. }));
    }
    assert!(!engine.is_active().await);
}

#[tokio::test]
async fn test_trigger_during_open_session_is_suppressed() {
    let store: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::in_memory().unwrap());
    let engine = engine(store.clone(), RecordingChannel::new());
    let open = engine.start_session().await.unwrap().session_id;

    let mut heartbeat = scheduler(ScriptedDetector::always_person(), engine.clone(), heartbeat_config(60, 30));
    heartbeat.tick().await;
    heartbeat.tick().await;
    assert_eq!(heartbeat.tick().await, TickOutcome::Suppressed);

    assert_eq!(engine.active_session().await.unwrap().session_id, open);
    assert_eq!(store.recent_presence(10).unwrap().len(), 1);
}

#[tokio::test]
async fn test_detector_error_counts_as_negative() {
    let store: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::in_memory().unwrap());
    let engine = engine(store, RecordingChannel::new());
    let detector = ScriptedDetector::new(vec![
        person(0.9),
        person(0.9),
        Err(SentinelError::detector("camera unplugged")),
        person(0.9),
        Ok(DetectionSample::new(0.1, "none")),
    ]);
    let mut heartbeat = scheduler(detector, engine.clone(), heartbeat_config(60, 30));

    heartbeat.tick().await;
    heartbeat.tick().await;
    assert!(matches!(heartbeat.tick().await, TickOutcome::Skipped { .. }));
    // The failed frame sits in the window, so three in a row is not reached.
    assert_eq!(heartbeat.tick().await, TickOutcome::Observed { positive_frames: 2 });
    // An empty frame slides in as a negative without clearing the window.
    assert_eq!(heartbeat.tick().await, TickOutcome::Observed { positive_frames: 1 });
    assert!(!engine.is_active().await);
}

#[tokio::test(start_paused = true)]
async fn test_detector_timeout_skips_tick() {
    let store: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::in_memory().unwrap());
    let engine = engine(store, RecordingChannel::new());
    let detector = ScriptedDetector::always_person().with_delays(vec![Duration::from_secs(120)]);
    let mut heartbeat = scheduler(detector.clone(), engine, heartbeat_config(60, 30));

    let outcome = heartbeat.tick().await;
    let TickOutcome::Skipped { reason } = outcome else {
        panic!("expected a skipped tick");
    };
    assert!(reason.to_lowercase().contains("timed out"), "{}", reason);

    assert_eq!(heartbeat.tick().await, TickOutcome::Observed { positive_frames: 1 });
    assert_eq!(detector.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_overrun_does_not_burst() {
    let store: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::in_memory().unwrap());
    let engine = engine(store, RecordingChannel::new());
    let detector = ScriptedDetector::new(empty_frames(10))
        .with_delays(vec![Duration::from_secs(150)]);
    let heartbeat = scheduler(detector.clone(), engine, heartbeat_config(60, 200));

    let cancel = CancellationToken::new();
    let task = tokio::spawn(heartbeat.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(detector.calls(), 1);

    // The overrunning tick is followed by one immediate tick, not three.
    tokio::time::sleep(Duration::from_secs(55)).await;
    assert_eq!(detector.calls(), 2);
    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(detector.calls(), 2);
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(detector.calls(), 3);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_wake_forces_immediate_tick() {
    let store: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::in_memory().unwrap());
    let engine = engine(store, RecordingChannel::new());
    let detector = ScriptedDetector::new(empty_frames(10));
    let heartbeat = scheduler(detector.clone(), engine, heartbeat_config(60, 30));
    let wake = heartbeat.wake_handle();

    let cancel = CancellationToken::new();
    let task = tokio::spawn(heartbeat.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(detector.calls(), 1);

    wake.notify_one();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(detector.calls(), 2);

    cancel.cancel();
    task.await.unwrap();
}
