//! Topic-feed scans.
//!
//! A scan walks the selected topics in catalog order. For each topic it asks
//! the search client, replaces that topic's feed entry and appends a history
//! record before moving on. The feed document (with fresh meta) is written
//! once at the end. A topic that fails keeps its previous entry.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::config::IntelConfig;
use crate::feed::FeedStore;
use crate::gate::{ScanBusy, ScanGate, ScanPermit};
use crate::models::{FeedEntry, FeedMeta, HistoryRecord, ScanStatus, Topic, FEED_VERSION};
use crate::progress::{NoProgress, ScanProgressEvent, ScanProgressReporter};
use crate::search::{SearchAnswer, SearchClient, SonarClient};
use crate::topics;

/// Outcome of one topic scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopicScanReport {
    pub selected: Vec<usize>,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub total_tokens: u64,
    /// Set when the scan could not run or could not persist the feed.
    pub error: Option<String>,
}

impl TopicScanReport {
    pub fn summary(&self) -> String {
        format!(
            "{}/{} topics, {} tokens",
            self.succeeded.len(),
            self.selected.len(),
            self.total_tokens
        )
    }
}

pub struct IntelScanner {
    topics: Vec<Topic>,
    search: Option<Arc<dyn SearchClient>>,
    /// Why `search` is absent, reported when a scan is attempted.
    unavailable: Option<String>,
    feed: FeedStore,
    gate: Arc<ScanGate>,
    delay: Duration,
    reporter: Box<dyn ScanProgressReporter>,
}

impl IntelScanner {
    pub fn new(
        topics: Vec<Topic>,
        search: Arc<dyn SearchClient>,
        feed: FeedStore,
        gate: Arc<ScanGate>,
    ) -> Self {
        Self {
            topics,
            search: Some(search),
            unavailable: None,
            feed,
            gate,
            delay: Duration::from_millis(1000),
            reporter: Box::new(NoProgress),
        }
    }

    /// Builds the scanner from config. A missing search credential does not
    /// fail construction; scans then end with the credential error in status.
    pub fn from_config(config: &IntelConfig, gate: Arc<ScanGate>) -> Self {
        let (search, unavailable): (Option<Arc<dyn SearchClient>>, Option<String>) =
            match SonarClient::from_config(config) {
                Ok(client) => {
                    tracing::info!(key = %client.masked_key(), model = %config.model, "search client ready");
                    (Some(Arc::new(client) as Arc<dyn SearchClient>), None)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "topic scans disabled");
                    (None, Some(e.to_string()))
                }
            };
        Self {
            topics: config.topic_catalog(),
            search,
            unavailable,
            feed: FeedStore::from_config(config),
            gate,
            delay: Duration::from_millis(config.delay_ms),
            reporter: Box::new(NoProgress),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_reporter(mut self, reporter: Box<dyn ScanProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn feed_store(&self) -> &FeedStore {
        &self.feed
    }

    pub fn gate(&self) -> &Arc<ScanGate> {
        &self.gate
    }

    /// Resolves a requested subset against the catalog.
    pub fn select(&self, indices: Option<&[i64]>) -> Vec<usize> {
        topics::select(self.topics.len(), indices)
    }

    /// Starts a scan on a background worker and returns the selection.
    pub fn trigger(self: &Arc<Self>, indices: Option<&[i64]>) -> Result<Vec<usize>, ScanBusy> {
        let permit = self.gate.try_acquire()?;
        self.gate.set_status(&permit, ScanStatus::starting());
        let selected = self.select(indices);
        let this = Arc::clone(self);
        let worker_selection = selected.clone();
        self.gate.spawn_worker(async move {
            this.scan_selected(&permit, &worker_selection).await;
        });
        Ok(selected)
    }

    /// Runs a scan in the caller's task.
    pub async fn scan(&self, indices: Option<&[i64]>) -> Result<TopicScanReport, ScanBusy> {
        let permit = self.gate.try_acquire()?;
        let selected = self.select(indices);
        Ok(self.scan_selected(&permit, &selected).await)
    }

    /// The scan body. The caller must hold the gate.
    pub async fn scan_selected(&self, permit: &ScanPermit, selected: &[usize]) -> TopicScanReport {
        self.gate.set_status(permit, ScanStatus::starting());
        let started_at = Utc::now();
        let mut report = TopicScanReport {
            selected: selected.to_vec(),
            ..TopicScanReport::default()
        };

        let Some(search) = self.search.as_ref() else {
            let reason = self
                .unavailable
                .clone()
                .unwrap_or_else(|| "search client unavailable".to_string());
            self.gate.set_status(permit, ScanStatus::failed(reason.clone()));
            report.error = Some(reason);
            return report;
        };

        let mut feed = self.feed.load_feed();
        let total = selected.len();

        for (n, &index) in selected.iter().enumerate() {
            let topic = &self.topics[index];
            let label = format!("{} {}", topic.icon, topic.label);
            self.gate
                .set_progress(permit, format!("{} ({}/{})", label, n + 1, total));
            self.reporter.report(ScanProgressEvent::Started {
                n: n + 1,
                total,
                label: label.clone(),
            });

            match search.search(topic).await {
                Ok(answer) => {
                    let tokens = answer.tokens_used;
                    tracing::info!(topic = %topic.id, tokens, "topic scanned");
                    feed.upsert(feed_entry(topic, answer, started_at));
                    if let Err(e) = self.feed.append_history(HistoryRecord {
                        id: topic.id.clone(),
                        timestamp: Utc::now(),
                        tokens,
                    }) {
                        tracing::error!(error = %format!("{:#}", e), "history write failed");
                    }
                    report.total_tokens += tokens;
                    report.succeeded.push(topic.id.clone());
                    self.reporter.report(ScanProgressEvent::Finished {
                        label,
                        ok: true,
                        detail: format!("{} tokens", tokens),
                    });
                }
                Err(e) => {
                    tracing::warn!(topic = %topic.id, error = %e, "topic scan failed");
                    report.failed.push((topic.id.clone(), e.to_string()));
                    self.reporter.report(ScanProgressEvent::Finished {
                        label,
                        ok: false,
                        detail: e.to_string(),
                    });
                }
            }

            if n + 1 < total && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        let finished_at = Utc::now();
        feed.version = FEED_VERSION.to_string();
        feed.meta = FeedMeta {
            last_scan: Some(finished_at),
            total_tokens_this_scan: report.total_tokens,
            topics_scanned: report.succeeded.len(),
            total_topics: self.topics.len(),
            version: FEED_VERSION.to_string(),
        };

        let summary = report.summary();
        self.reporter.report(ScanProgressEvent::Summary {
            line: summary.clone(),
        });

        match self.feed.save_feed(&feed) {
            Ok(()) => {
                tracing::info!(path = %self.feed.feed_path().display(), %summary, "feed saved");
                self.gate
                    .set_status(permit, ScanStatus::finished(finished_at, summary));
            }
            Err(e) => {
                let message = format!("feed write failed: {:#}", e);
                tracing::error!(error = %message);
                self.gate.set_status(permit, ScanStatus::failed(message.clone()));
                report.error = Some(message);
            }
        }
        report
    }
}

fn feed_entry(topic: &Topic, answer: SearchAnswer, scanned_at: DateTime<Utc>) -> FeedEntry {
    FeedEntry {
        id: topic.id.clone(),
        topic: topic.label.clone(),
        category: topic.category.clone(),
        icon: topic.icon.clone(),
        frequency: topic.frequency,
        content: answer.content,
        citations: answer.citations,
        related_questions: answer.related_questions,
        tokens_used: answer.tokens_used,
        scanned_at,
        model: answer.model,
    }
}
