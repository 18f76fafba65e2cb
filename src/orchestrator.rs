//! Scan orchestration over the Work-Item Store.
//!
//! One pass:
//!
//! 1. fetch the whole collection (failure ends the pass with nothing done);
//! 2. select pending items (no analysis, not claimed by another pass);
//! 3. analyze each in store order, recording failures as analysis text so
//!    they are not picked up again;
//! 4. write the entire collection back in one call if anything changed;
//! 5. report how many items still lack an analysis.
//!
//! A pass runs under the process-wide [`ScanGate`]; see [`ScanOrchestrator::run_pass`].

use chrono::Utc;
use std::sync::Arc;

use crate::analyzer::Analyzer;
use crate::completion::{create_completion_client, CompletionError};
use crate::config::Config;
use crate::fetch::HttpFetcher;
use crate::gate::{ScanBusy, ScanGate, ScanPermit};
use crate::models::{ScanStatus, WorkItem};
use crate::progress::{NoProgress, ScanProgressEvent, ScanProgressReporter};
use crate::store::{HttpStore, WorkItemStore};

/// Prefix of the analysis text recorded for a failed item.
pub const FAILURE_PREFIX: &str = "Analysis failed: ";

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    /// Items returned by the store.
    pub fetched: usize,
    /// Items selected for analysis this pass.
    pub selected: usize,
    pub analyzed: usize,
    pub failed: usize,
    /// Whether the collection was written back successfully.
    pub written: bool,
    /// Items whose analysis is still empty after the pass.
    pub pending: usize,
    /// Store read or write failure, if any.
    pub store_error: Option<String>,
}

impl PassReport {
    pub fn summary(&self) -> String {
        if let Some(err) = &self.store_error {
            return format!("store error: {}", err);
        }
        if self.selected == 0 {
            return "no new items".to_string();
        }
        format!(
            "{} analyzed, {} failed, {} pending",
            self.analyzed, self.failed, self.pending
        )
    }
}

/// Analysis text stored for an item whose analyzer failed.
pub fn failure_text(err: &CompletionError) -> String {
    format!("{}{}", FAILURE_PREFIX, err)
}

pub struct ScanOrchestrator {
    store: Arc<dyn WorkItemStore>,
    analyzer: Analyzer,
    gate: Arc<ScanGate>,
    analyzed_by: String,
    reporter: Box<dyn ScanProgressReporter>,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn WorkItemStore>,
        analyzer: Analyzer,
        gate: Arc<ScanGate>,
        analyzed_by: &str,
    ) -> Self {
        Self {
            store,
            analyzer,
            gate,
            analyzed_by: analyzed_by.to_string(),
            reporter: Box::new(NoProgress),
        }
    }

    /// Wires the HTTP store, fetchers and completion client from config.
    pub fn from_config(config: &Config, gate: Arc<ScanGate>) -> anyhow::Result<Self> {
        let store = Arc::new(HttpStore::new(&config.store)?);
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
        let completion: Arc<dyn crate::completion::CompletionClient> =
            Arc::from(create_completion_client(config)?);
        let analyzer = Analyzer::new(fetcher, completion, config.completion.max_tokens);
        Ok(Self::new(store, analyzer, gate, &config.store.source_tag))
    }

    pub fn with_reporter(mut self, reporter: Box<dyn ScanProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn gate(&self) -> &Arc<ScanGate> {
        &self.gate
    }

    /// Runs one pass if no other scan holds the gate.
    pub async fn run_pass(&self) -> Result<PassReport, ScanBusy> {
        let permit = self.gate.try_acquire()?;
        Ok(self.run_pass_with(&permit).await)
    }

    /// Starts a pass on a background worker. Returns the current status when
    /// another scan is already running.
    pub fn trigger(self: &Arc<Self>) -> Result<(), ScanBusy> {
        let permit = self.gate.try_acquire()?;
        self.gate.set_status(&permit, ScanStatus::starting());
        let this = Arc::clone(self);
        self.gate.spawn_worker(async move {
            this.run_pass_with(&permit).await;
        });
        Ok(())
    }

    /// The pass body. The caller must hold the gate.
    pub async fn run_pass_with(&self, permit: &ScanPermit) -> PassReport {
        self.gate.set_status(permit, ScanStatus::starting());
        let mut report = PassReport::default();

        let mut items = match self.store.fetch_all().await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "fetching work items failed");
                report.store_error = Some(format!("{:#}", e));
                self.gate
                    .set_status(permit, ScanStatus::failed(report.summary()));
                return report;
            }
        };
        report.fetched = items.len();

        let pending: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_pending())
            .map(|(i, _)| i)
            .collect();
        report.selected = pending.len();

        if pending.is_empty() {
            tracing::info!(fetched = report.fetched, "no new items");
            report.pending = count_unanalyzed(&items);
            self.finish(permit, &report);
            return report;
        }

        tracing::info!(pending = pending.len(), fetched = report.fetched, "analyzing items");

        for (n, &idx) in pending.iter().enumerate() {
            let label = describe(&items[idx]);
            self.gate.set_progress(
                permit,
                format!("{} ({}/{})", label, n + 1, pending.len()),
            );
            self.reporter.report(ScanProgressEvent::Started {
                n: n + 1,
                total: pending.len(),
                label: label.clone(),
            });

            let outcome = self.analyzer.analyze(&items[idx]).await;
            let item = &mut items[idx];
            match outcome {
                Ok(text) => {
                    tracing::info!(item = %item.id, chars = text.len(), "analysis complete");
                    self.reporter.report(ScanProgressEvent::Finished {
                        label,
                        ok: true,
                        detail: format!("{} chars", text.chars().count()),
                    });
                    item.analysis = Some(text);
                    item.analyzed = true;
                    item.analyzed_by = Some(self.analyzed_by.clone());
                    item.analyzed_at = Some(Utc::now().to_rfc3339());
                    report.analyzed += 1;
                }
                Err(e) => {
                    tracing::warn!(item = %item.id, error = %e, "analysis failed");
                    self.reporter.report(ScanProgressEvent::Finished {
                        label,
                        ok: false,
                        detail: e.to_string(),
                    });
                    item.analysis = Some(failure_text(&e));
                    item.analyzed = true;
                    report.failed += 1;
                }
            }
        }

        match self.store.save_all(&items).await {
            Ok(count) => {
                tracing::info!(count, "saved items to store");
                report.written = true;
            }
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "write-back failed, analyses from this pass are lost");
                report.store_error = Some(format!("write-back failed: {:#}", e));
            }
        }

        report.pending = count_unanalyzed(&items);
        self.finish(permit, &report);
        report
    }

    fn finish(&self, permit: &ScanPermit, report: &PassReport) {
        let summary = report.summary();
        self.reporter.report(ScanProgressEvent::Summary {
            line: summary.clone(),
        });
        let status = if report.store_error.is_some() {
            ScanStatus::failed(summary)
        } else {
            ScanStatus::finished(Utc::now(), summary)
        };
        self.gate.set_status(permit, status);
    }
}

fn count_unanalyzed(items: &[WorkItem]) -> usize {
    items.iter().filter(|i| !i.has_analysis()).count()
}

fn describe(item: &WorkItem) -> String {
    let preview: String = item
        .content
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .or(item.memo.as_deref())
        .unwrap_or("")
        .chars()
        .take(50)
        .collect();
    format!(
        "[{}] {} {}",
        item.type_tag,
        Analyzer::mode_for(item).label(),
        preview
    )
}
