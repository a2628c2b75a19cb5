use async_trait::async_trait;

use crate::errors::{BenchError, BenchResult};
use crate::services::traits::ImageFetcher;

/// Plain HTTP GET download.
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> BenchResult<Vec<u8>> {
        if url.is_empty() {
            return Err(BenchError::Fetch("empty URL".into()));
        }
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(BenchError::Fetch(format!("{} for {}", response.status(), url)));
        }
        let bytes = response.bytes().await?;
        tracing::debug!(url = %url, size = bytes.len(), "image downloaded");
        Ok(bytes.to_vec())
    }
}
