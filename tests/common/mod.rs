//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use intake_scanner::analyzer::Analyzer;
use intake_scanner::completion::{CompletionClient, CompletionError, CompletionRequest};
use intake_scanner::extract::PageText;
use intake_scanner::fetch::{ContentFetcher, VideoContent};
use intake_scanner::gate::ScanGate;
use intake_scanner::models::{Topic, WorkItem};
use intake_scanner::orchestrator::ScanOrchestrator;
use intake_scanner::search::{SearchAnswer, SearchClient};

// ─── Work-item store ───────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    pub items: Mutex<Vec<WorkItem>>,
    pub writes: Mutex<Vec<Vec<WorkItem>>>,
    pub fail_fetch: bool,
    pub fail_save: bool,
}

impl MemoryStore {
    pub fn with_items(items: Vec<WorkItem>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Self::default()
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn last_write(&self) -> Vec<WorkItem> {
        self.writes.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl intake_scanner::store::WorkItemStore for MemoryStore {
    async fn fetch_all(&self) -> Result<Vec<WorkItem>> {
        if self.fail_fetch {
            bail!("connection refused");
        }
        Ok(self.items.lock().unwrap().clone())
    }

    async fn save_all(&self, items: &[WorkItem]) -> Result<usize> {
        if self.fail_save {
            bail!("store rejected write-back with 500");
        }
        self.writes.lock().unwrap().push(items.to_vec());
        *self.items.lock().unwrap() = items.to_vec();
        Ok(items.len())
    }
}

// ─── Content fetcher ───────────────────────────────────────────────

pub struct StubFetcher;

#[async_trait]
impl ContentFetcher for StubFetcher {
    async fn fetch_video(&self, _url: &str) -> Result<VideoContent> {
        Ok(VideoContent {
            title: "A talk".into(),
            description: "About things".into(),
            transcript: "hello and welcome".into(),
        })
    }

    async fn fetch_page(&self, _url: &str) -> Result<PageText> {
        Ok(PageText {
            title: "Example Domain".into(),
            text: "This domain is for use in illustrative examples.".into(),
        })
    }
}

// ─── Completion client ─────────────────────────────────────────────

/// Records every request; fails any prompt containing `fail_marker`.
#[derive(Default)]
pub struct RecordingCompletion {
    pub requests: Mutex<Vec<CompletionRequest>>,
    pub fail_marker: Option<String>,
}

impl RecordingCompletion {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl CompletionClient for RecordingCompletion {
    fn route(&self) -> &str {
        "test"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(marker) = &self.fail_marker {
            if request.prompt.contains(marker.as_str()) {
                return Err(CompletionError::Http {
                    status: 529,
                    body: "overloaded".into(),
                });
            }
        }
        Ok(format!("analysis #{}", self.requests.lock().unwrap().len()))
    }
}

pub fn orchestrator(
    store: Arc<MemoryStore>,
    completion: Arc<RecordingCompletion>,
    gate: Arc<ScanGate>,
) -> ScanOrchestrator {
    let analyzer = Analyzer::new(Arc::new(StubFetcher), completion, 2000);
    ScanOrchestrator::new(store, analyzer, gate, "test-runner")
}

// ─── Search client ─────────────────────────────────────────────────

/// Answers every topic. When built with [`GatedSearch::blocked`], each call
/// waits for a permit so tests can hold a scan open.
pub struct GatedSearch {
    pub permits: Arc<Semaphore>,
    pub gate: Option<Arc<ScanGate>>,
    /// Progress text observed at the start of each call.
    pub seen_progress: Mutex<Vec<String>>,
}

impl GatedSearch {
    pub fn open() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            gate: None,
            seen_progress: Mutex::new(Vec::new()),
        }
    }

    pub fn blocked() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(0)),
            gate: None,
            seen_progress: Mutex::new(Vec::new()),
        }
    }

    pub fn observing(gate: Arc<ScanGate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::open()
        }
    }
}

#[async_trait]
impl SearchClient for GatedSearch {
    async fn search(&self, topic: &Topic) -> Result<SearchAnswer, CompletionError> {
        if let Some(gate) = &self.gate {
            self.seen_progress
                .lock()
                .unwrap()
                .push(gate.status().progress);
        }
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;
        Ok(SearchAnswer {
            content: format!("- update on {}", topic.id),
            citations: vec!["https://news.example/1".into()],
            related_questions: vec!["What next?".into()],
            tokens_used: 250,
            model: "sonar".into(),
        })
    }
}
