//! Control-surface routes exercised in-process with `oneshot`.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use common::{orchestrator, GatedSearch, MemoryStore, RecordingCompletion};
use intake_scanner::feed::FeedStore;
use intake_scanner::gate::ScanGate;
use intake_scanner::intel::IntelScanner;
use intake_scanner::models::{ItemKind, WorkItem};
use intake_scanner::server::{router, AppState};
use intake_scanner::topics::builtin_topics;

struct Harness {
    _tmp: TempDir,
    app: Router,
    gate: Arc<ScanGate>,
    intel: Arc<IntelScanner>,
    store: Arc<MemoryStore>,
}

fn harness(search: GatedSearch, topic_count: usize) -> Harness {
    let tmp = TempDir::new().unwrap();
    let gate = Arc::new(ScanGate::new());
    let feed = FeedStore::new(
        tmp.path().join("intelligence_feed.json"),
        tmp.path().join("intelligence_history.json"),
        500,
    );
    let topics = builtin_topics().into_iter().take(topic_count).collect();
    let intel = Arc::new(
        IntelScanner::new(topics, Arc::new(search), feed, gate.clone()).with_delay(Duration::ZERO),
    );
    let store = Arc::new(MemoryStore::with_items(vec![WorkItem::new(
        1,
        ItemKind::Note,
        "hello",
    )]));
    let orch = Arc::new(orchestrator(
        store.clone(),
        Arc::new(RecordingCompletion::default()),
        gate.clone(),
    ));
    let app = router(AppState {
        gate: gate.clone(),
        intel: intel.clone(),
        orchestrator: Some(orch),
    });
    Harness {
        _tmp: tmp,
        app,
        gate,
        intel,
        store,
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health_reports_topics_and_idle() {
    let h = harness(GatedSearch::open(), 8);
    let (status, body) = call(&h.app, "GET", "/health", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["scanning"], false);
    assert_eq!(body["topics_available"], 8);
    assert!(body["time"].is_string());
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn reads_before_any_scan_are_empty() {
    let h = harness(GatedSearch::open(), 8);

    let (status, feed) = call(&h.app, "GET", "/feed", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed, serde_json::json!({ "entries": {}, "meta": {} }));

    let (_, history) = call(&h.app, "GET", "/api/intelligence/history", "").await;
    assert_eq!(history, serde_json::json!([]));

    let (_, status_body) = call(&h.app, "GET", "/status", "").await;
    assert_eq!(status_body["scanning"], false);
}

#[tokio::test]
async fn topics_listing_has_indices() {
    let h = harness(GatedSearch::open(), 8);
    let (status, body) = call(&h.app, "GET", "/api/intelligence/topics", "").await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 8);
    assert_eq!(list[0]["index"], 0);
    assert_eq!(list[0]["id"], "phishing_trends");
    assert_eq!(list[0]["frequency"], "daily");
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let h = harness(GatedSearch::open(), 8);
    let (status, body) = call(&h.app, "GET", "/nope", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn second_trigger_conflicts_and_starts_no_worker() {
    let search = GatedSearch::blocked();
    let permits = search.permits.clone();
    let h = harness(search, 2);

    let (first, body) = call(&h.app, "POST", "/scan", "").await;
    assert_eq!(first, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "started");
    assert_eq!(body["topics"], serde_json::json!([0, 1]));

    let (second, body) = call(&h.app, "POST", "/api/intelligence/scan", "{}").await;
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Scan already in progress");
    assert_eq!(body["status"]["scanning"], true);

    // The item trigger shares the same gate.
    let (items, _) = call(&h.app, "POST", "/items/scan", "").await;
    assert_eq!(items, StatusCode::CONFLICT);

    assert_eq!(h.gate.workers_started(), 1);

    permits.add_permits(10);
    assert!(h.gate.wait_idle(Duration::from_secs(5)).await);
    assert!(!h.gate.status().scanning);
}

#[tokio::test]
async fn status_lifecycle_over_two_topics() {
    let gate_probe = Arc::new(ScanGate::new());
    // Build the harness first, then point the observing search at its gate.
    let tmp = TempDir::new().unwrap();
    let feed = FeedStore::new(
        tmp.path().join("feed.json"),
        tmp.path().join("history.json"),
        500,
    );
    let search = Arc::new(GatedSearch::observing(gate_probe.clone()));
    let topics: Vec<_> = builtin_topics().into_iter().take(2).collect();
    let intel = Arc::new(
        IntelScanner::new(topics.clone(), search.clone(), feed, gate_probe.clone())
            .with_delay(Duration::ZERO),
    );
    let app = router(AppState {
        gate: gate_probe.clone(),
        intel: intel.clone(),
        orchestrator: None,
    });

    assert!(!gate_probe.status().scanning);
    let triggered_at = Utc::now();

    let (status, _) = call(&app, "POST", "/scan", r#"{"topics": [0, 1]}"#).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(gate_probe.wait_idle(Duration::from_secs(5)).await);

    let seen = search.seen_progress.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].contains(&topics[0].label) && seen[0].ends_with("(1/2)"));
    assert!(seen[1].contains(&topics[1].label) && seen[1].ends_with("(2/2)"));

    let final_status = gate_probe.status();
    assert!(!final_status.scanning);
    assert!(final_status.last_scan.unwrap() >= triggered_at);
    assert_eq!(final_status.progress, "2/2 topics, 500 tokens");

    let (_, feed) = call(&app, "GET", "/feed", "").await;
    let entries = feed["entries"].as_object().unwrap();
    assert_eq!(entries.len(), 2);
    for topic in &topics {
        let scanned_at: chrono::DateTime<Utc> =
            serde_json::from_value(entries[&topic.id]["scanned_at"].clone()).unwrap();
        assert!(scanned_at >= triggered_at);
    }
    assert_eq!(feed["meta"]["topics_scanned"], 2);

    let (_, history) = call(&app, "GET", "/history", "").await;
    assert_eq!(history.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn out_of_range_subset_finishes_empty() {
    let h = harness(GatedSearch::open(), 8);
    let (status, body) = call(&h.app, "POST", "/scan", r#"{"topics": [99]}"#).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["topics"], serde_json::json!([]));
    assert!(h.gate.wait_idle(Duration::from_secs(5)).await);
    assert_eq!(h.gate.status().progress, "0/0 topics, 0 tokens");
    assert_eq!(h.intel.feed_store().load_feed().meta.topics_scanned, 0);
}

#[tokio::test]
async fn item_trigger_runs_a_pass() {
    let h = harness(GatedSearch::open(), 8);
    let (status, body) = call(&h.app, "POST", "/items/scan", "").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "started");
    assert!(h.gate.wait_idle(Duration::from_secs(5)).await);

    assert_eq!(h.store.write_count(), 1);
    let (_, status_body) = call(&h.app, "GET", "/items/status", "").await;
    assert_eq!(status_body["scanning"], false);
    assert_eq!(status_body["progress"], "1 analyzed, 0 failed, 0 pending");
}
