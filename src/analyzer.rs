//! Analyzer registry: one analysis capability per [`ItemKind`].
//!
//! Each variant declares a [`KindProfile`]: where its descriptive text comes
//! from and which token budget applies. [`Analyzer::analyze`] turns a work
//! item into a completion request from that profile and the prompt policy in
//! [`crate::prompt`], then asks the completion service.
//!
//! Content fetch failures degrade to an empty descriptor (the item is still
//! analyzed from its reference alone). Completion failures are returned as a
//! [`CompletionError`] for the orchestrator to record.

use std::sync::Arc;

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::extract::{truncate_chars, PageText};
use crate::fetch::{ContentFetcher, VideoContent};
use crate::models::{ItemKind, WorkItem};
use crate::prompt::{build_prompt, PromptMode};

/// Description ceiling inside a video prompt.
const VIDEO_DESCRIPTION_CHARS: usize = 300;
/// Transcript fragment ceiling inside a video prompt.
const VIDEO_TRANSCRIPT_CHARS: usize = 5000;
/// Budgets for terse reference types and notes.
const TERSE_GENERIC_TOKENS: u32 = 800;
const TERSE_TARGETED_TOKENS: u32 = 600;

/// Where an item's descriptive text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    /// Title, description and transcript via the video fetcher.
    Video,
    /// Title and page text, capped at `body_chars` in the prompt.
    Page { label: &'static str, body_chars: usize },
    /// Only the reference itself; nothing is fetched.
    ReferenceOnly { label: &'static str },
    /// The item's own text.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    LongForm,
    Terse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindProfile {
    pub source: ContentSource,
    pub budget: Budget,
}

impl ItemKind {
    pub fn profile(&self) -> KindProfile {
        let (source, budget) = match self {
            ItemKind::Video => (ContentSource::Video, Budget::LongForm),
            ItemKind::Article => (
                ContentSource::Page {
                    label: "URL",
                    body_chars: 5000,
                },
                Budget::LongForm,
            ),
            ItemKind::Link => (
                ContentSource::Page {
                    label: "URL",
                    body_chars: 3000,
                },
                Budget::LongForm,
            ),
            ItemKind::GitHub => (
                ContentSource::Page {
                    label: "GitHub URL",
                    body_chars: 3000,
                },
                Budget::LongForm,
            ),
            ItemKind::Instagram => (
                ContentSource::ReferenceOnly {
                    label: "Instagram URL",
                },
                Budget::Terse,
            ),
            ItemKind::Twitter => (
                ContentSource::ReferenceOnly {
                    label: "Twitter/X URL",
                },
                Budget::Terse,
            ),
            ItemKind::Note => (ContentSource::Text, Budget::Terse),
        };
        KindProfile { source, budget }
    }
}

/// Token budget for a profile in a given prompt mode. Targeted prompts are
/// always narrower than generic ones.
pub fn token_budget(budget: Budget, mode: PromptMode, long_form_tokens: u32) -> u32 {
    match (budget, mode) {
        (Budget::LongForm, PromptMode::Generic) => long_form_tokens,
        (Budget::LongForm, PromptMode::Targeted) => {
            ((u64::from(long_form_tokens) * 3 / 5) as u32).max(1)
        }
        (Budget::Terse, PromptMode::Generic) => TERSE_GENERIC_TOKENS.min(long_form_tokens),
        (Budget::Terse, PromptMode::Targeted) => TERSE_TARGETED_TOKENS.min(long_form_tokens),
    }
}

pub struct Analyzer {
    fetcher: Arc<dyn ContentFetcher>,
    completion: Arc<dyn CompletionClient>,
    long_form_tokens: u32,
}

impl Analyzer {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        completion: Arc<dyn CompletionClient>,
        long_form_tokens: u32,
    ) -> Self {
        Self {
            fetcher,
            completion,
            long_form_tokens,
        }
    }

    /// Prompt mode the item will be analyzed in.
    pub fn mode_for(item: &WorkItem) -> PromptMode {
        PromptMode::for_focus(item.focus())
    }

    /// Builds the completion request for `item` (fetching content as needed).
    pub async fn prepare(&self, item: &WorkItem) -> CompletionRequest {
        let profile = item.kind().profile();
        let mode = Self::mode_for(item);
        let (descriptor, body) = self.describe(profile.source, item).await;
        CompletionRequest {
            prompt: build_prompt(item.focus(), &descriptor, &body),
            max_tokens: token_budget(profile.budget, mode, self.long_form_tokens),
        }
    }

    pub async fn analyze(&self, item: &WorkItem) -> Result<String, CompletionError> {
        let request = self.prepare(item).await;
        self.completion.complete(&request).await
    }

    async fn describe(&self, source: ContentSource, item: &WorkItem) -> (String, String) {
        let reference = item.content_text();
        match source {
            ContentSource::Video => {
                let video = self
                    .fetcher
                    .fetch_video(reference)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!(item = %item.id, error = %e, "video fetch failed, analyzing reference only");
                        VideoContent::default()
                    });
                let descriptor = format!(
                    "Video URL: {}\nTitle: {}\nDescription: {}",
                    reference,
                    video.title,
                    truncate_chars(&video.description, VIDEO_DESCRIPTION_CHARS)
                );
                let body = if video.transcript.is_empty() {
                    String::new()
                } else {
                    format!(
                        "\nTranscript (fragment): {}",
                        truncate_chars(&video.transcript, VIDEO_TRANSCRIPT_CHARS)
                    )
                };
                (descriptor, body)
            }
            ContentSource::Page { label, body_chars } => {
                let page = self.fetcher.fetch_page(reference).await.unwrap_or_else(|e| {
                    tracing::warn!(item = %item.id, error = %e, "page fetch failed, analyzing reference only");
                    PageText::default()
                });
                (
                    format!("{}: {}\nTitle: {}", label, reference, page.title),
                    format!("\nContent: {}", truncate_chars(&page.text, body_chars)),
                )
            }
            ContentSource::ReferenceOnly { label } => {
                (format!("{}: {}", label, reference), String::new())
            }
            ContentSource::Text => {
                let text = if reference.trim().is_empty() {
                    item.memo.as_deref().unwrap_or("")
                } else {
                    reference
                };
                (format!("Note: {}", text), String::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    struct StaticFetcher;

    #[async_trait]
    impl ContentFetcher for StaticFetcher {
        async fn fetch_video(&self, _url: &str) -> Result<VideoContent> {
            Ok(VideoContent {
                title: "Talk".into(),
                description: "d".repeat(1000),
                transcript: "t".repeat(9000),
            })
        }

        async fn fetch_page(&self, url: &str) -> Result<PageText> {
            if url.contains("broken") {
                return Err(anyhow!("connection reset"));
            }
            Ok(PageText {
                title: "Page".into(),
                text: "x".repeat(9000),
            })
        }
    }

    struct Echo;

    #[async_trait]
    impl CompletionClient for Echo {
        fn route(&self) -> &str {
            "test"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
            Ok(request.prompt.clone())
        }
    }

    fn analyzer() -> Analyzer {
        Analyzer::new(Arc::new(StaticFetcher), Arc::new(Echo), 2000)
    }

    #[test]
    fn targeted_budgets_are_narrower() {
        for budget in [Budget::LongForm, Budget::Terse] {
            assert!(
                token_budget(budget, PromptMode::Targeted, 2000)
                    < token_budget(budget, PromptMode::Generic, 2000)
            );
        }
        assert!(
            token_budget(Budget::Terse, PromptMode::Generic, 2000)
                < token_budget(Budget::LongForm, PromptMode::Generic, 2000)
        );
    }

    #[test]
    fn large_budgets_do_not_overflow() {
        assert_eq!(
            token_budget(Budget::LongForm, PromptMode::Targeted, 2_000_000_000),
            1_200_000_000
        );
        assert_eq!(
            token_budget(Budget::LongForm, PromptMode::Targeted, u32::MAX),
            (u64::from(u32::MAX) * 3 / 5) as u32
        );
        assert_eq!(token_budget(Budget::LongForm, PromptMode::Targeted, 1), 1);
    }

    #[tokio::test]
    async fn video_fields_are_truncated() {
        let item = WorkItem::new(1, ItemKind::Video, "https://youtu.be/x");
        let req = analyzer().prepare(&item).await;
        assert!(req.prompt.contains("Title: Talk"));
        assert!(req.prompt.contains(&format!("Description: {}\n", "d".repeat(300))));
        assert!(!req.prompt.contains(&"t".repeat(5001)));
        assert!(req.prompt.contains(&"t".repeat(5000)));
        assert_eq!(req.max_tokens, 2000);
    }

    #[tokio::test]
    async fn link_body_cap_is_smaller_than_article() {
        let a = analyzer();
        let link = a
            .prepare(&WorkItem::new(1, ItemKind::Link, "https://e.com"))
            .await;
        let article = a
            .prepare(&WorkItem::new(2, ItemKind::Article, "https://e.com"))
            .await;
        assert!(link.prompt.contains(&"x".repeat(3000)));
        assert!(!link.prompt.contains(&"x".repeat(3001)));
        assert!(article.prompt.contains(&"x".repeat(5000)));
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_reference() {
        let item = WorkItem::new(1, ItemKind::GitHub, "https://broken.example/repo");
        let req = analyzer().prepare(&item).await;
        assert!(req.prompt.contains("GitHub URL: https://broken.example/repo"));
        assert!(req.prompt.contains("Title: \n"));
    }

    #[tokio::test]
    async fn social_items_are_not_fetched_and_terse() {
        let item = WorkItem::new(1, ItemKind::Twitter, "https://x.com/a/status/1");
        let req = analyzer().prepare(&item).await;
        assert!(req.prompt.contains("Twitter/X URL: https://x.com/a/status/1"));
        assert_eq!(req.max_tokens, TERSE_GENERIC_TOKENS);
    }

    #[tokio::test]
    async fn unknown_type_uses_note_profile() {
        let mut item = WorkItem::new(1, ItemKind::Note, "remember the milk");
        item.type_tag = "voice-memo".into();
        let req = analyzer().prepare(&item).await;
        assert!(req.prompt.contains("Note: remember the milk"));
    }

    #[tokio::test]
    async fn note_without_content_uses_memo_text() {
        let mut item = WorkItem::new(1, ItemKind::Note, "").with_memo("call the plumber");
        item.content = None;
        let req = analyzer().prepare(&item).await;
        assert!(req.prompt.contains("Note: call the plumber"));
        assert_eq!(req.max_tokens, TERSE_TARGETED_TOKENS);
    }
}
