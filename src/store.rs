//! Work-Item Store client.
//!
//! The store is a remote endpoint with exactly two verbs: `GET` returns the
//! whole collection as `{ "items": [...] }` and `POST` replaces it with
//! `{ "items": [...], "source": "<tag>" }`, answering `{ "count": N }`.
//! There is no partial update, so callers always send the full set back.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::StoreConfig;
use crate::models::WorkItem;

#[async_trait]
pub trait WorkItemStore: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<WorkItem>>;

    /// Replaces the collection; returns the count the store acknowledged.
    async fn save_all(&self, items: &[WorkItem]) -> Result<usize>;
}

#[derive(Debug, Deserialize)]
struct ItemsEnvelope {
    #[serde(default)]
    items: Vec<WorkItem>,
}

#[derive(Debug, Serialize)]
struct SaveRequest<'a> {
    items: &'a [WorkItem],
    source: &'a str,
}

#[derive(Debug, Deserialize)]
struct SaveResponse {
    count: Option<usize>,
}

pub struct HttpStore {
    client: reqwest::Client,
    endpoint: String,
    source_tag: String,
}

impl HttpStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            source_tag: config.source_tag.clone(),
        })
    }
}

#[async_trait]
impl WorkItemStore for HttpStore {
    async fn fetch_all(&self) -> Result<Vec<WorkItem>> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("store returned {}: {}", status, body);
        }

        let envelope: ItemsEnvelope = response
            .json()
            .await
            .context("store returned an unreadable item collection")?;
        Ok(envelope.items)
    }

    async fn save_all(&self, items: &[WorkItem]) -> Result<usize> {
        let body = SaveRequest {
            items,
            source: &self.source_tag,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("store rejected write-back with {}: {}", status, body);
        }

        let ack: SaveResponse = response.json().await.unwrap_or(SaveResponse { count: None });
        Ok(ack.count.unwrap_or(items.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemKind;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> HttpStore {
        HttpStore::new(&StoreConfig {
            endpoint: format!("{}/api/dump", server.uri()),
            source_tag: "test-runner".into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_reads_items_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dump"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    { "id": 1, "type": "link", "content": "https://a.example" },
                    { "id": "n-2", "type": "note", "content": "hi", "analyzed": true, "analysis": "ok" }
                ],
                "updated": "2024-01-01T00:00:00Z"
            })))
            .mount(&server)
            .await;

        let items = store_for(&server).fetch_all().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind(), ItemKind::Link);
        assert!(!items[1].is_pending());
    }

    #[tokio::test]
    async fn missing_items_key_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "No storage configured" })))
            .mount(&server)
            .await;
        assert!(store_for(&server).fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_sends_source_tag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/dump"))
            .and(body_partial_json(json!({ "source": "test-runner" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "count": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let items = vec![WorkItem::new(1, ItemKind::Note, "x")];
        assert_eq!(store_for(&server).save_all(&items).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let err = store_for(&server).fetch_all().await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
