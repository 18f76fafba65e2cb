//! Daemon loop state transitions and stop latency.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{orchestrator, MemoryStore, RecordingCompletion};
use intake_scanner::daemon::{Daemon, DaemonState};
use intake_scanner::gate::ScanGate;
use intake_scanner::models::{ItemKind, WorkItem};

fn daemon(store: Arc<MemoryStore>, gate: Arc<ScanGate>, interval: Duration) -> Arc<Daemon> {
    let orch = Arc::new(orchestrator(
        store,
        Arc::new(RecordingCompletion::default()),
        gate,
    ));
    Arc::new(Daemon::new(orch, interval).with_step(Duration::from_millis(10)))
}

async fn wait_for_state(daemon: &Daemon, wanted: DaemonState) {
    for _ in 0..500 {
        if daemon.state() == wanted {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("daemon never reached {:?}", wanted);
}

#[tokio::test]
async fn stop_is_honoured_within_one_step() {
    let store = Arc::new(MemoryStore::with_items(vec![WorkItem::new(
        1,
        ItemKind::Note,
        "hello",
    )]));
    let d = daemon(store.clone(), Arc::new(ScanGate::new()), Duration::from_secs(3600));
    assert_eq!(d.state(), DaemonState::Idle);

    let runner = d.clone();
    let task = tokio::spawn(async move { runner.run().await });

    wait_for_state(&d, DaemonState::Waiting).await;
    assert_eq!(store.write_count(), 1);

    let asked = Instant::now();
    d.stop_flag().stop();
    let ticks = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("daemon did not stop")
        .unwrap();

    assert!(asked.elapsed() < Duration::from_secs(1));
    assert_eq!(ticks, 1);
    assert_eq!(d.state(), DaemonState::Stopped);
}

#[tokio::test]
async fn loop_keeps_running_after_store_errors() {
    let store = Arc::new(MemoryStore {
        fail_fetch: true,
        ..MemoryStore::default()
    });
    let gate = Arc::new(ScanGate::new());
    let d = daemon(store, gate.clone(), Duration::from_millis(20));

    let runner = d.clone();
    let task = tokio::spawn(async move { runner.run().await });

    tokio::time::sleep(Duration::from_millis(150)).await;
    d.stop_flag().stop();
    let ticks = task.await.unwrap();

    assert!(ticks >= 2, "expected several ticks, got {}", ticks);
    assert!(gate.status().error.is_some());
}

#[tokio::test]
async fn tick_is_skipped_while_another_scan_holds_the_gate() {
    let store = Arc::new(MemoryStore::with_items(vec![WorkItem::new(
        1,
        ItemKind::Note,
        "hello",
    )]));
    let gate = Arc::new(ScanGate::new());
    let held = gate.try_acquire().unwrap();
    let d = daemon(store.clone(), gate, Duration::from_secs(3600));

    let runner = d.clone();
    let task = tokio::spawn(async move { runner.run().await });
    wait_for_state(&d, DaemonState::Waiting).await;
    assert_eq!(store.write_count(), 0);

    d.stop_flag().stop();
    task.await.unwrap();
    drop(held);
}
