//! Hacker News Firebase API

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;
use crate::source::{FetchResult, ItemSource};
use crate::types::ExternalItem;

pub const DEFAULT_BASE_URL: &str = "https://hacker-news.firebaseio.com";

pub struct HackerNewsClient {
    client: Client,
    base_url: String,
}

impl HackerNewsClient {
    /// Create a client against `base_url` (no trailing `/v0`)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> FetchResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("skyrelay/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> FetchResult<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::NonOk {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(format!("{}: {}", url, e)))?;

        serde_json::from_slice(&body).map_err(|e| FetchError::Decode(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl ItemSource for HackerNewsClient {
    async fn fetch_ranked_list(&self) -> FetchResult<Vec<i64>> {
        let url = format!("{}/v0/topstories.json", self.base_url);
        let ids: Vec<i64> = self.get_json(&url).await?;
        debug!(count = ids.len(), "Fetched top stories");
        Ok(ids)
    }

    async fn fetch_item(&self, id: i64) -> FetchResult<ExternalItem> {
        let url = format!("{}/v0/item/{}.json", self.base_url, id);

        // Deleted or unknown items come back as a literal `null`
        let item: Option<ExternalItem> = self.get_json(&url).await?;
        let item = item.ok_or_else(|| FetchError::Decode(format!("{}: item {} is null", url, id)))?;

        debug!(id = item.id, title = %item.title, "Fetched item");
        Ok(item)
    }

    fn name(&self) -> &str {
        "hackernews"
    }
}
