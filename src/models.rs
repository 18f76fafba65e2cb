//! Core data models shared by the orchestrator, the topic scanner and the
//! control surface.
//!
//! Work items are owned by the remote store and only round-trip through this
//! process, so [`WorkItem`] keeps every field it does not understand in
//! [`WorkItem::extra`] and writes it back untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque item identifier. The store hands out both numeric and string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Int(i64),
    Text(String),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Int(n) => write!(f, "{}", n),
            ItemId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ItemId {
    fn from(n: i64) -> Self {
        ItemId::Int(n)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId::Text(s.to_string())
    }
}

/// A queued unit of content awaiting analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,
    /// Raw type tag as stored upstream; see [`WorkItem::kind`].
    #[serde(rename = "type", default = "default_type_tag")]
    pub type_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default)]
    pub analyzed: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub analyzing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_by: Option<String>,
    /// Kept as text: upstream writers use several timestamp formats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<String>,
    /// Fields owned by other consumers (title, icon, pinned, created, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_type_tag() -> String {
    "note".to_string()
}

impl WorkItem {
    /// Convenience constructor used by tests and tooling.
    pub fn new(id: impl Into<ItemId>, kind: ItemKind, content: &str) -> Self {
        Self {
            id: id.into(),
            type_tag: kind.tag().to_string(),
            content: Some(content.to_string()),
            memo: None,
            analysis: None,
            analyzed: false,
            analyzing: false,
            analyzed_by: None,
            analyzed_at: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_memo(mut self, memo: &str) -> Self {
        self.memo = Some(memo.to_string());
        self
    }

    /// Resolved analyzer variant; unknown tags fall back to [`ItemKind::Note`].
    pub fn kind(&self) -> ItemKind {
        ItemKind::from_tag(&self.type_tag)
    }

    pub fn content_text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// The memo when it carries a non-blank focus string.
    pub fn focus(&self) -> Option<&str> {
        self.memo
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    pub fn has_analysis(&self) -> bool {
        self.analysis
            .as_deref()
            .is_some_and(|a| !a.trim().is_empty())
    }

    /// Pending iff there is no analysis and no concurrent pass claimed it.
    pub fn is_pending(&self) -> bool {
        !self.has_analysis() && !self.analyzing
    }
}

/// Closed set of analyzer variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Video,
    Article,
    Link,
    /// Instagram post reference.
    Instagram,
    /// Twitter / X post reference.
    Twitter,
    /// GitHub repository or file reference.
    GitHub,
    Note,
}

impl ItemKind {
    pub const ALL: [ItemKind; 7] = [
        ItemKind::Video,
        ItemKind::Article,
        ItemKind::Link,
        ItemKind::Instagram,
        ItemKind::Twitter,
        ItemKind::GitHub,
        ItemKind::Note,
    ];

    /// Maps a stored tag to a variant. Anything unrecognised is a note.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "youtube" | "video" => ItemKind::Video,
            "article" => ItemKind::Article,
            "link" => ItemKind::Link,
            "instagram" => ItemKind::Instagram,
            "twitter" | "x" => ItemKind::Twitter,
            "github" => ItemKind::GitHub,
            _ => ItemKind::Note,
        }
    }

    /// Canonical tag written by [`WorkItem::new`].
    pub fn tag(&self) -> &'static str {
        match self {
            ItemKind::Video => "youtube",
            ItemKind::Article => "article",
            ItemKind::Link => "link",
            ItemKind::Instagram => "instagram",
            ItemKind::Twitter => "twitter",
            ItemKind::GitHub => "github",
            ItemKind::Note => "note",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// How far back a topic's search should look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// Recency window passed to the search service.
    pub fn recency_filter(&self) -> &'static str {
        match self {
            Frequency::Daily => "week",
            Frequency::Weekly | Frequency::Monthly => "month",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

/// A statically configured recurring inquiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    #[serde(alias = "topic")]
    pub label: String,
    pub frequency: Frequency,
    pub category: String,
    #[serde(default)]
    pub icon: String,
    pub query: String,
}

/// Latest result for one topic. Replaces any earlier entry with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub id: String,
    pub topic: String,
    pub category: String,
    pub icon: String,
    pub frequency: Frequency,
    pub content: String,
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(default)]
    pub related_questions: Vec<String>,
    pub tokens_used: u64,
    pub scanned_at: DateTime<Utc>,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedMeta {
    pub last_scan: Option<DateTime<Utc>>,
    pub total_tokens_this_scan: u64,
    pub topics_scanned: usize,
    pub total_topics: usize,
    pub version: String,
}

/// Persisted feed document, keyed by topic id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    #[serde(default = "feed_version")]
    pub version: String,
    #[serde(default)]
    pub entries: BTreeMap<String, FeedEntry>,
    #[serde(default)]
    pub meta: FeedMeta,
}

pub const FEED_VERSION: &str = "1.0";

fn feed_version() -> String {
    FEED_VERSION.to_string()
}

impl Default for Feed {
    fn default() -> Self {
        Self {
            version: feed_version(),
            entries: BTreeMap::new(),
            meta: FeedMeta::default(),
        }
    }
}

impl Feed {
    /// Last-write-wins per topic id.
    pub fn upsert(&mut self, entry: FeedEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }
}

/// One successful topic scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub tokens: u64,
}

/// The single live record describing the current or last scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub scanning: bool,
    pub last_scan: Option<DateTime<Utc>>,
    pub progress: String,
    pub error: Option<String>,
}

impl ScanStatus {
    pub fn starting() -> Self {
        Self {
            scanning: true,
            last_scan: None,
            progress: "Starting...".to_string(),
            error: None,
        }
    }

    pub fn finished(at: DateTime<Utc>, summary: impl Into<String>) -> Self {
        Self {
            scanning: false,
            last_scan: Some(at),
            progress: summary.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            scanning: false,
            last_scan: None,
            progress: String::new(),
            error: Some(error.into()),
        }
    }
}
