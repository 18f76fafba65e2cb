//! Completion service client.
//!
//! Defines the [`CompletionClient`] trait used by the analyzers and a
//! Messages-API implementation that can talk to the service in two ways:
//!
//! - **direct** — when the configured credential env var is set, requests go
//!   straight to `completion.api_url` with the key attached;
//! - **proxy** — otherwise the same body is posted to the store's `/api/ai`
//!   relay, which holds the credential.
//!
//! The route is picked once by [`create_completion_client`] and is invisible
//! to callers. Every failure is a [`CompletionError`] whose `Display` is the
//! text that ends up in an item's `analysis`.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

/// Longest slice of an error body kept in [`CompletionError::Http`].
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompletionError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no analysis available")]
    Empty,
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CompletionError::Network("request timed out".to_string())
        } else {
            CompletionError::Network(e.to_string())
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// `"direct"` or `"proxy"`; informational only.
    fn route(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Proxy,
}

/// Messages-API client (direct or via the relay).
pub struct MessagesClient {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    route: Route,
}

impl MessagesClient {
    pub fn direct(url: &str, model: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.to_string(),
            model: model.to_string(),
            api_key: Some(api_key.to_string()),
            route: Route::Direct,
        })
    }

    pub fn proxy(url: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.to_string(),
            model: model.to_string(),
            api_key: None,
            route: Route::Proxy,
        })
    }
}

#[async_trait]
impl CompletionClient for MessagesClient {
    fn route(&self) -> &str {
        match self.route {
            Route::Direct => "direct",
            Route::Proxy => "proxy",
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": [{ "role": "user", "content": request.prompt }],
        });

        let mut builder = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let (Route::Direct, Some(key)) = (self.route, &self.api_key) {
            builder = builder
                .header("x-api-key", key)
                .header("anthropic-version", "2023-06-01");
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str::<Value>(&text) {
            Ok(json) => match parse_messages_response(&json) {
                // A JSON body without content on a failed status is still an HTTP error.
                Err(CompletionError::Empty) if !status.is_success() => {
                    Err(http_error(status.as_u16(), &text))
                }
                other => other,
            },
            Err(_) if !status.is_success() => Err(http_error(status.as_u16(), &text)),
            Err(e) => Err(CompletionError::Malformed(e.to_string())),
        }
    }
}

fn http_error(status: u16, body: &str) -> CompletionError {
    CompletionError::Http {
        status,
        body: crate::extract::truncate_chars(body, MAX_ERROR_BODY_CHARS).to_string(),
    }
}

/// Joins the `text` blocks of a Messages response, or surfaces its error.
pub fn parse_messages_response(json: &Value) -> Result<String, CompletionError> {
    if let Some(blocks) = json.get("content").and_then(Value::as_array) {
        let text: String = blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect();
        if text.trim().is_empty() {
            return Err(CompletionError::Empty);
        }
        return Ok(text);
    }

    if let Some(err) = json.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| err.as_str())
            .unwrap_or("unknown");
        return Err(CompletionError::Api(message.to_string()));
    }

    Err(CompletionError::Empty)
}

/// Builds the client for this process: direct when the credential env var is
/// set, otherwise the store relay.
pub fn create_completion_client(config: &Config) -> anyhow::Result<Box<dyn CompletionClient>> {
    let cc = &config.completion;
    let timeout = Duration::from_secs(cc.timeout_secs);
    let key = std::env::var(&cc.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty());

    match key {
        Some(key) => {
            tracing::info!(route = "direct", model = %cc.model, "completion client ready");
            Ok(Box::new(MessagesClient::direct(
                &cc.api_url,
                &cc.model,
                key.trim(),
                timeout,
            )?))
        }
        None => {
            let proxy = cc.proxy_url_for(&config.store.endpoint)?;
            tracing::info!(
                route = "proxy",
                url = %proxy,
                "{} not set, routing completions through the relay",
                cc.api_key_env
            );
            Ok(Box::new(MessagesClient::proxy(&proxy, &cc.model, timeout)?))
        }
    }
}
