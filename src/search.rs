//! Search-backed completion for topic scans.
//!
//! A topic scan asks an online search-completion service one question per
//! topic and keeps its answer together with the citations and follow-up
//! questions the service returns.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::completion::CompletionError;
use crate::config::IntelConfig;
use crate::models::Topic;

const SYSTEM_PROMPT: &str = "You are an intelligence analyst for a browser-based security product. \
Provide concise, actionable intelligence. Use bullet points. \
Always include specific names, dates, and numbers when available. \
End with 1-2 sentences on relevance for a browser-based scam detection product.";

/// The useful parts of one search answer, already capped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchAnswer {
    pub content: String,
    pub citations: Vec<String>,
    pub related_questions: Vec<String>,
    pub tokens_used: u64,
    pub model: String,
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, topic: &Topic) -> Result<SearchAnswer, CompletionError>;
}

/// Client for an OpenAI-style chat-completions endpoint with web search.
pub struct SonarClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_citations: usize,
    max_related: usize,
}

impl SonarClient {
    /// Fails when no credential can be found (environment or env file).
    pub fn from_config(config: &IntelConfig) -> anyhow::Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            anyhow::anyhow!(
                "{} not found in the environment or env file; add {}=<key>",
                config.api_key_env,
                config.api_key_env
            )
        })?;
        Self::with_key(config, &api_key)
    }

    pub fn with_key(config: &IntelConfig, api_key: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
            url: config.api_url.clone(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_citations: config.max_citations,
            max_related: config.max_related,
        })
    }

    /// Key preview for logs: first 8 and last 4 characters.
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 12 {
            return "****".to_string();
        }
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }

    fn request_body(&self, topic: &Topic) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": topic.query },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "search_recency_filter": topic.frequency.recency_filter(),
            "return_related_questions": true,
            "web_search_options": { "search_context_size": "medium" },
        })
    }
}

#[async_trait]
impl SearchClient for SonarClient {
    async fn search(&self, topic: &Topic) -> Result<SearchAnswer, CompletionError> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .json(&self.request_body(topic))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Http {
                status: status.as_u16(),
                body: crate::extract::truncate_chars(&body, 200).to_string(),
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;
        parse_search_response(&json, &self.model, self.max_citations, self.max_related)
    }
}

/// Extracts answer text, citations, related questions and token usage.
pub fn parse_search_response(
    json: &Value,
    default_model: &str,
    max_citations: usize,
    max_related: usize,
) -> Result<SearchAnswer, CompletionError> {
    if let Some(message) = json
        .get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(Value::as_str)
    {
        return Err(CompletionError::Api(message.to_string()));
    }

    let content = json
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let strings = |key: &str, cap: usize| -> Vec<String> {
        json.get(key)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .take(cap)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    Ok(SearchAnswer {
        content,
        citations: strings("citations", max_citations),
        related_questions: strings("related_questions", max_related),
        tokens_used: json
            .pointer("/usage/total_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        model: json
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(default_model)
            .to_string(),
    })
}
