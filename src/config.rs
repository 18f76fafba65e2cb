//! TOML configuration parsing.
//!
//! Every section has defaults so a minimal file only needs `[store].endpoint`.
//! See [`load_config`] for the validation rules applied after parsing.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::Topic;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub intel: IntelConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Work-item endpoint, e.g. `https://worker.example.dev/api/dump`.
    pub endpoint: String,
    /// Sent as `source` on write-back and recorded as `analyzed_by`.
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

fn default_source_tag() -> String {
    "local-analyzer".to_string()
}
fn default_store_timeout() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_url")]
    pub api_url: String,
    /// Proxy used when no direct credential is present. Defaults to
    /// `<store origin>/api/ai`.
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default = "default_completion_model")]
    pub model: String,
    /// Budget for long-form generic analyses.
    #[serde(default = "default_completion_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_completion_key_env")]
    pub api_key_env: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_url: default_completion_url(),
            proxy_url: None,
            model: default_completion_model(),
            max_tokens: default_completion_max_tokens(),
            timeout_secs: default_completion_timeout(),
            api_key_env: default_completion_key_env(),
        }
    }
}

fn default_completion_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}
fn default_completion_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_completion_max_tokens() -> u32 {
    2000
}
fn default_completion_timeout() -> u64 {
    60
}
fn default_completion_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_video_timeout")]
    pub video_timeout_secs: u64,
    #[serde(default = "default_yt_dlp")]
    pub yt_dlp: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            video_timeout_secs: default_video_timeout(),
            yt_dlp: default_yt_dlp(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    15
}
fn default_video_timeout() -> u64 {
    30
}
fn default_yt_dlp() -> String {
    "yt-dlp".to_string()
}
fn default_user_agent() -> String {
    format!(
        "Mozilla/5.0 (compatible; intake-scanner/{})",
        env!("CARGO_PKG_VERSION")
    )
}

#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// How long shutdown waits for an in-flight pass or worker.
    #[serde(default = "default_grace")]
    pub grace_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            grace_secs: default_grace(),
        }
    }
}

fn default_interval() -> u64 {
    60
}
fn default_grace() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:4900".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IntelConfig {
    #[serde(default = "default_intel_url")]
    pub api_url: String,
    #[serde(default = "default_intel_model")]
    pub model: String,
    #[serde(default = "default_intel_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_intel_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_intel_key_env")]
    pub api_key_env: String,
    /// Dotenv-style file consulted when the key is not in the environment.
    /// Defaults to `~/.env`.
    #[serde(default)]
    pub env_file: Option<PathBuf>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    /// Pause between topics.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_max_citations")]
    pub max_citations: usize,
    #[serde(default = "default_max_related")]
    pub max_related: usize,
    /// Overrides the built-in catalog when present.
    #[serde(default)]
    pub topics: Option<Vec<Topic>>,
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self {
            api_url: default_intel_url(),
            model: default_intel_model(),
            max_tokens: default_intel_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_intel_timeout(),
            api_key_env: default_intel_key_env(),
            env_file: None,
            data_dir: default_data_dir(),
            history_cap: default_history_cap(),
            delay_ms: default_delay_ms(),
            max_citations: default_max_citations(),
            max_related: default_max_related(),
            topics: None,
        }
    }
}

fn default_intel_url() -> String {
    "https://api.perplexity.ai/chat/completions".to_string()
}
fn default_intel_model() -> String {
    "sonar".to_string()
}
fn default_intel_max_tokens() -> u32 {
    600
}
fn default_temperature() -> f32 {
    0.2
}
fn default_intel_timeout() -> u64 {
    30
}
fn default_intel_key_env() -> String {
    "PERPLEXITY_API_KEY".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_history_cap() -> usize {
    500
}
fn default_delay_ms() -> u64 {
    1000
}
fn default_max_citations() -> usize {
    5
}
fn default_max_related() -> usize {
    3
}

impl Config {
    /// Defaults everywhere; used by commands that can run without a file.
    pub fn minimal() -> Self {
        Self {
            store: StoreConfig {
                endpoint: "http://127.0.0.1:8787/api/dump".to_string(),
                source_tag: default_source_tag(),
                timeout_secs: default_store_timeout(),
            },
            completion: CompletionConfig::default(),
            fetch: FetchConfig::default(),
            daemon: DaemonConfig::default(),
            server: ServerConfig::default(),
            intel: IntelConfig::default(),
        }
    }
}

impl CompletionConfig {
    /// Resolves the proxy route: explicit `proxy_url`, else `/api/ai` on the
    /// store's origin.
    pub fn proxy_url_for(&self, store_endpoint: &str) -> Result<String> {
        if let Some(url) = &self.proxy_url {
            return Ok(url.clone());
        }
        let mut url = parse_http_url(store_endpoint)?;
        url.set_path("/api/ai");
        url.set_query(None);
        url.set_fragment(None);
        Ok(url.to_string())
    }
}

impl IntelConfig {
    pub fn feed_path(&self) -> PathBuf {
        self.data_dir.join("intelligence_feed.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("intelligence_history.json")
    }

    /// Topics from config, or the built-in catalog.
    pub fn topic_catalog(&self) -> Vec<Topic> {
        self.topics
            .clone()
            .unwrap_or_else(crate::topics::builtin_topics)
    }

    /// Looks up the search credential: environment first, then the env file.
    pub fn api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var(&self.api_key_env) {
            if !key.trim().is_empty() {
                return Some(key.trim().to_string());
            }
        }
        let path = self
            .env_file
            .clone()
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".env")))?;
        key_from_env_file(&path, &self.api_key_env)
    }
}

/// Reads `name` from a dotenv file without touching the process environment.
/// Empty values and unparseable lines are skipped.
pub fn key_from_env_file(path: &Path, name: &str) -> Option<String> {
    dotenvy::from_path_iter(path)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Parses an endpoint and requires an http(s) scheme.
fn parse_http_url(endpoint: &str) -> Result<reqwest::Url> {
    let url = reqwest::Url::parse(endpoint)
        .with_context(|| format!("invalid URL '{}'", endpoint))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => anyhow::bail!("URL '{}' must be http(s), got scheme '{}'", endpoint, other),
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    parse_http_url(&config.store.endpoint).context("store.endpoint")?;

    if let Some(proxy) = &config.completion.proxy_url {
        parse_http_url(proxy).context("completion.proxy_url")?;
    }

    if config.completion.max_tokens == 0 {
        anyhow::bail!("completion.max_tokens must be > 0");
    }

    if config.intel.max_tokens == 0 {
        anyhow::bail!("intel.max_tokens must be > 0");
    }

    if config.daemon.interval_secs == 0 {
        anyhow::bail!("daemon.interval_secs must be > 0");
    }

    if config.intel.history_cap == 0 {
        anyhow::bail!("intel.history_cap must be > 0");
    }

    if !(0.0..=2.0).contains(&config.intel.temperature) {
        anyhow::bail!("intel.temperature must be in [0.0, 2.0]");
    }

    if let Some(topics) = &config.intel.topics {
        let mut seen = std::collections::HashSet::new();
        for t in topics {
            if !seen.insert(t.id.as_str()) {
                anyhow::bail!("intel.topics contains duplicate id '{}'", t.id);
            }
        }
    }

    Ok(())
}
