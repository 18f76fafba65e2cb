//! Control-surface HTTP server.
//!
//! A small JSON API for a local dashboard: read the live scan status, the
//! persisted feed and history, list topics, and trigger scans. Every route is
//! also served under `/api/intelligence`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness, scanning flag, topic count |
//! | `GET`  | `/status` | Live [`ScanStatus`](crate::models::ScanStatus) |
//! | `GET`  | `/feed` | Persisted feed document |
//! | `GET`  | `/history` | Persisted history array |
//! | `GET`  | `/topics` | Topic catalog with indices |
//! | `POST` | `/scan` | Start a topic scan (`{"topics": [0, 2]}` or empty for all) |
//! | `POST` | `/items/scan` | Start a work-item pass |
//! | `GET`  | `/items/status` | Same as `/status` |
//!
//! Triggers answer `202` when a worker was started and `409` with the current
//! status when a scan is already running. Reads never wait on a running scan.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no route for /nope" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::daemon::{shutdown_signal, Daemon, StopFlag};
use crate::gate::{ScanBusy, ScanGate};
use crate::intel::IntelScanner;
use crate::orchestrator::ScanOrchestrator;
use crate::topics;

const SERVER_NAME: &str = "intake-scanner";

/// Shared state for all handlers. One gate backs every trigger.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<ScanGate>,
    pub intel: Arc<IntelScanner>,
    /// Absent when the work-item side could not be configured.
    pub orchestrator: Option<Arc<ScanOrchestrator>>,
}

/// Builds the router with CORS and the JSON 404 fallback.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes())
        .nest("/api/intelligence", routes())
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(state)
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/feed", get(handle_feed))
        .route("/history", get(handle_history))
        .route("/topics", get(handle_topics))
        .route("/scan", post(handle_scan))
        .route("/items/scan", post(handle_items_scan))
        .route("/items/status", get(handle_status))
}

/// Starts the control surface and blocks until Ctrl-C or SIGTERM.
///
/// With `with_daemon`, the periodic work-item loop runs in the same process
/// and shares the scan gate. On shutdown the server stops accepting
/// requests, the loop is asked to stop, and any in-flight scan gets up to
/// `daemon.grace_secs` to finish.
pub async fn run_server(config: &Config, with_daemon: bool) -> anyhow::Result<()> {
    let gate = Arc::new(ScanGate::new());
    let intel = Arc::new(IntelScanner::from_config(&config.intel, gate.clone()));
    let orchestrator = match ScanOrchestrator::from_config(config, gate.clone()) {
        Ok(o) => Some(Arc::new(o)),
        Err(e) => {
            if with_daemon {
                return Err(e.context("work-item daemon cannot start"));
            }
            tracing::warn!(error = %format!("{:#}", e), "work-item scans disabled");
            None
        }
    };

    let stop = StopFlag::new();
    let grace = Duration::from_secs(config.daemon.grace_secs);
    let daemon_task = match (&orchestrator, with_daemon) {
        (Some(orchestrator), true) => {
            let daemon = Daemon::new(
                orchestrator.clone(),
                Duration::from_secs(config.daemon.interval_secs),
            )
            .with_stop_flag(stop.clone());
            Some(tokio::spawn(async move { daemon.run().await }))
        }
        _ => None,
    };

    let app = router(AppState {
        gate: gate.clone(),
        intel: intel.clone(),
        orchestrator,
    });

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(
        addr = %bind_addr,
        topics = intel.topics().len(),
        daemon = with_daemon,
        "control surface listening"
    );
    println!("Control surface listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    stop.stop();
    if let Some(task) = daemon_task {
        if tokio::time::timeout(grace, task).await.is_err() {
            tracing::warn!("daemon still running after grace period");
        }
    }
    gate.wait_idle(grace).await;
    tracing::info!("control surface stopped");
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "unavailable".to_string(),
        message: message.into(),
    }
}

/// `409` body: the live status of the scan that holds the gate.
fn conflict(busy: ScanBusy) -> Response {
    (
        StatusCode::CONFLICT,
        Json(serde_json::json!({
            "error": "Scan already in progress",
            "status": busy.status,
        })),
    )
        .into_response()
}

// ============ Handlers ============

async fn handle_not_found(uri: Uri) -> AppError {
    not_found(format!("no route for {}", uri.path()))
}

async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "time": Utc::now().to_rfc3339(),
        "scanning": state.gate.is_scanning(),
        "topics_available": state.intel.topics().len(),
    }))
}

async fn handle_status(State(state): State<AppState>) -> Json<crate::models::ScanStatus> {
    Json(state.gate.status())
}

async fn handle_feed(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.intel.feed_store().read_feed_json())
}

async fn handle_history(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.intel.feed_store().read_history_json())
}

async fn handle_topics(State(state): State<AppState>) -> Json<Vec<topics::TopicInfo>> {
    Json(topics::describe(state.intel.topics()))
}

#[derive(Debug, Default, Deserialize)]
struct ScanRequest {
    #[serde(default)]
    topics: Option<Vec<i64>>,
}

/// An empty or unparseable body selects every topic.
fn requested_topics(body: &[u8]) -> Option<Vec<i64>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    serde_json::from_slice::<ScanRequest>(body)
        .ok()
        .and_then(|r| r.topics)
}

async fn handle_scan(State(state): State<AppState>, body: Bytes) -> Response {
    let requested = requested_topics(&body);
    match state.intel.trigger(requested.as_deref()) {
        Ok(selected) => {
            tracing::info!(topics = ?selected, "topic scan started");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "status": "started",
                    "message": format!("Scanning {} topics...", selected.len()),
                    "topics": selected,
                })),
            )
                .into_response()
        }
        Err(busy) => conflict(busy),
    }
}

async fn handle_items_scan(State(state): State<AppState>) -> Response {
    let Some(orchestrator) = state.orchestrator.as_ref() else {
        return unavailable("work-item scans are not configured").into_response();
    };
    match orchestrator.trigger() {
        Ok(()) => {
            tracing::info!("work-item pass started");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "status": "started",
                    "message": "Scanning work items...",
                })),
            )
                .into_response()
        }
        Err(busy) => conflict(busy),
    }
}
