//! HTTP feed, for batches published by a scraper service

use super::{parse_batch, FeedError, SourceFeed};
use crate::item::Item;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::debug;

/// GETs a JSON item batch from a URL
pub struct HttpJsonFeed {
    name: String,
    url: String,
    client: HttpClient,
}

impl HttpJsonFeed {
    /// Create a feed named `name` fetching `url`
    #[must_use]
    pub fn new(name: &str, url: &str, client: HttpClient) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
        }
    }
}

#[async_trait]
impl SourceFeed for HttpJsonFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_batch(&self) -> Result<Vec<Item>, FeedError> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let items = parse_batch(&body)?;
        debug!(source = %self.name, url = %self.url, count = items.len(), "Fetched batch");
        Ok(items)
    }
}
