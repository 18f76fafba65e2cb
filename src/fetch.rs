//! Content fetchers: turn an item's reference into descriptive text.
//!
//! [`ContentFetcher`] is the seam the analyzers depend on. [`HttpFetcher`]
//! fetches web pages with reqwest and video metadata/captions by shelling out
//! to `yt-dlp`. Fetch failures are returned as errors; the analyzer decides
//! how to degrade.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::FetchConfig;
use crate::extract::{
    check_content_type, clean_captions, extract_page, truncate_chars, PageText,
    MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS,
};

/// Title, description and caption text of a video.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoContent {
    pub title: String,
    pub description: String,
    pub transcript: String,
}

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetches metadata and cleaned captions for a video URL.
    async fn fetch_video(&self, url: &str) -> Result<VideoContent>;

    /// Fetches a web page and reduces it to title + text.
    async fn fetch_page(&self, url: &str) -> Result<PageText>;
}

/// Production fetcher: reqwest for pages, `yt-dlp` for videos.
pub struct HttpFetcher {
    client: reqwest::Client,
    yt_dlp: String,
    video_timeout: Duration,
}

/// Longest slice of fetcher stderr kept in an error.
const MAX_STDERR_CHARS: usize = 300;

static VIDEO_WORKDIR_SEQ: AtomicU64 = AtomicU64::new(0);

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            yt_dlp: config.yt_dlp.clone(),
            video_timeout: Duration::from_secs(config.video_timeout_secs),
        })
    }

    fn video_workdir() -> PathBuf {
        let seq = VIDEO_WORKDIR_SEQ.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("intake-video-{}-{}", std::process::id(), seq))
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch_video(&self, url: &str) -> Result<VideoContent> {
        let workdir = Self::video_workdir();
        tokio::fs::create_dir_all(&workdir).await?;
        let result = run_yt_dlp(&self.yt_dlp, url, &workdir, self.video_timeout).await;
        let _ = tokio::fs::remove_dir_all(&workdir).await;
        result
    }

    async fn fetch_page(&self, url: &str) -> Result<PageText> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        check_content_type(content_type.as_deref())?;

        let html = response.text().await?;
        Ok(extract_page(&html)?)
    }
}

async fn run_yt_dlp(
    binary: &str,
    url: &str,
    workdir: &Path,
    timeout: Duration,
) -> Result<VideoContent> {
    let template = workdir.join("video_%(id)s");
    let mut cmd = tokio::process::Command::new(binary);
    cmd.args([
        "--skip-download",
        "--no-simulate",
        "--write-auto-sub",
        "--sub-lang",
        "en,nl",
        "--convert-subs",
        "srt",
        "--print",
        "title",
        "--print",
        "description",
        "-o",
    ])
    .arg(&template)
    .arg(url)
    .stdin(Stdio::null())
    .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            bail!("{} not found on PATH", binary)
        }
        Ok(Err(e)) => return Err(e).context("failed to run video fetcher"),
        Err(_) => bail!("video fetch timed out after {}s", timeout.as_secs()),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "{} failed ({}): {}",
            binary,
            output.status,
            truncate_chars(stderr.trim(), MAX_STDERR_CHARS)
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.trim().lines();
    let title = lines.next().unwrap_or("").to_string();
    let description = lines.collect::<Vec<_>>().join("\n");

    let transcript = match first_caption_file(workdir).await? {
        Some(path) => clean_captions(&tokio::fs::read_to_string(&path).await?),
        None => String::new(),
    };

    Ok(VideoContent {
        title: truncate_chars(&title, MAX_TITLE_CHARS).to_string(),
        description: truncate_chars(&description, MAX_DESCRIPTION_CHARS).to_string(),
        transcript,
    })
}

async fn first_caption_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "srt") {
            found.push(path);
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}
