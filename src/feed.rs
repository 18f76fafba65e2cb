//! Persistence for topic-scan results.
//!
//! Two JSON files under the data directory:
//!
//! - the **feed**: latest entry per topic id plus scan metadata;
//! - the **history**: bounded log of successful topic scans, oldest evicted
//!   first once the cap is reached.
//!
//! Both are written to a sibling temp file and renamed into place so a
//! reader never sees a half-written document. A missing or unreadable file
//! loads as empty.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::IntelConfig;
use crate::models::{Feed, HistoryRecord};

/// Bounded FIFO of history records.
#[derive(Debug, Clone, PartialEq)]
pub struct History {
    records: VecDeque<HistoryRecord>,
    cap: usize,
}

impl History {
    pub fn new(cap: usize) -> Self {
        Self {
            records: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    pub fn from_records(records: Vec<HistoryRecord>, cap: usize) -> Self {
        let mut history = Self::new(cap);
        for record in records {
            history.push(record);
        }
        history
    }

    /// Appends, evicting from the front while over capacity.
    pub fn push(&mut self, record: HistoryRecord) {
        self.records.push_back(record);
        while self.records.len() > self.cap {
            self.records.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }
}

#[derive(Debug, Clone)]
pub struct FeedStore {
    feed_path: PathBuf,
    history_path: PathBuf,
    history_cap: usize,
}

impl FeedStore {
    pub fn new(feed_path: PathBuf, history_path: PathBuf, history_cap: usize) -> Self {
        Self {
            feed_path,
            history_path,
            history_cap,
        }
    }

    pub fn from_config(config: &IntelConfig) -> Self {
        Self::new(config.feed_path(), config.history_path(), config.history_cap)
    }

    pub fn feed_path(&self) -> &Path {
        &self.feed_path
    }

    pub fn load_feed(&self) -> Feed {
        match fs::read_to_string(&self.feed_path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %self.feed_path.display(), error = %e, "feed file unreadable, starting empty");
                Feed::default()
            }),
            Err(_) => Feed::default(),
        }
    }

    pub fn save_feed(&self, feed: &Feed) -> Result<()> {
        write_json_atomic(&self.feed_path, feed)
    }

    pub fn load_history(&self) -> History {
        let records: Vec<HistoryRecord> = fs::read_to_string(&self.history_path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        History::from_records(records, self.history_cap)
    }

    pub fn save_history(&self, history: &History) -> Result<()> {
        let records: Vec<&HistoryRecord> = history.records().collect();
        write_json_atomic(&self.history_path, &records)
    }

    /// Loads, appends one record and writes back.
    pub fn append_history(&self, record: HistoryRecord) -> Result<()> {
        let mut history = self.load_history();
        history.push(record);
        self.save_history(&history)
    }

    /// Raw feed document for the read surface. A missing file reads as an
    /// empty feed.
    pub fn read_feed_json(&self) -> serde_json::Value {
        read_json_or(&self.feed_path, || {
            serde_json::json!({ "entries": {}, "meta": {} })
        })
    }

    /// Raw history array for the read surface.
    pub fn read_history_json(&self) -> serde_json::Value {
        read_json_or(&self.history_path, || serde_json::json!([]))
    }
}

fn read_json_or(path: &Path, empty: impl FnOnce() -> serde_json::Value) -> serde_json::Value {
    fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_else(empty)
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
