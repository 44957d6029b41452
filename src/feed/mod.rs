//! Source feeds
//!
//! A feed hands the relay one batch of normalized items per run, newest
//! first. Scraping itself happens elsewhere; the adapters here only read
//! what a scraper produced, from a file or over HTTP.

pub mod file;
pub mod http;

use crate::config::SourceSettings;
use crate::item::Item;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub use file::JsonFileFeed;
pub use http::HttpJsonFeed;

/// Errors raised while fetching a batch
#[derive(Error, Debug)]
pub enum FeedError {
    /// The batch file does not exist
    #[error("batch file not found: {0}")]
    Missing(String),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The batch is not a valid item list
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Supplier of item batches for one source
#[async_trait]
pub trait SourceFeed: Send + Sync {
    /// Source name, also names the state directory
    fn name(&self) -> &str;

    /// Fetch the current batch, newest first.
    async fn fetch_batch(&self) -> Result<Vec<Item>, FeedError>;
}

/// Accepted batch layouts: a bare array or `{"items": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum Batch {
    List(Vec<Item>),
    Wrapped { items: Vec<Item> },
}

/// Parse a batch document.
///
/// # Errors
///
/// Returns `FeedError::Json` when the document is neither layout.
pub fn parse_batch(content: &str) -> Result<Vec<Item>, FeedError> {
    let batch: Batch = serde_json::from_str(content)?;
    Ok(match batch {
        Batch::List(items) | Batch::Wrapped { items } => items,
    })
}

/// Feed wrapper applying a title keyword and community exclusions
pub struct FilteredFeed {
    inner: Box<dyn SourceFeed>,
    title_keyword: Option<String>,
    exclude_communities: Vec<String>,
}

impl FilteredFeed {
    /// Wrap `inner`; matching is case-insensitive.
    #[must_use]
    pub fn new(
        inner: Box<dyn SourceFeed>,
        title_keyword: Option<&str>,
        exclude_communities: &[String],
    ) -> Self {
        Self {
            inner,
            title_keyword: title_keyword
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty()),
            exclude_communities: exclude_communities
                .iter()
                .map(|c| normalize_community(c))
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    fn keeps(&self, item: &Item) -> bool {
        if let Some(keyword) = &self.title_keyword {
            let title = item.title.as_deref().unwrap_or_default().to_lowercase();
            if !title.contains(keyword.as_str()) {
                return false;
            }
        }
        match item.community.as_deref() {
            Some(community) => !self
                .exclude_communities
                .contains(&normalize_community(community)),
            None => true,
        }
    }
}

fn normalize_community(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    lowered
        .strip_prefix("r/")
        .map_or(lowered.clone(), str::to_string)
}

#[async_trait]
impl SourceFeed for FilteredFeed {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch_batch(&self) -> Result<Vec<Item>, FeedError> {
        let items = self.inner.fetch_batch().await?;
        let total = items.len();
        let kept: Vec<Item> = items.into_iter().filter(|i| self.keeps(i)).collect();
        if kept.len() != total {
            debug!(source = %self.name(), total, kept = kept.len(), "Applied source filters");
        }
        Ok(kept)
    }
}

/// Build the feed for a configured source.
///
/// `http(s)://` locations are fetched with `client`; anything else is a
/// local file path. Filters are applied when configured.
#[must_use]
pub fn from_settings(source: &SourceSettings, client: &HttpClient) -> Box<dyn SourceFeed> {
    let location = source.location.trim();
    let base: Box<dyn SourceFeed> =
        if location.starts_with("http://") || location.starts_with("https://") {
            Box::new(HttpJsonFeed::new(&source.name, location, client.clone()))
        } else {
            Box::new(JsonFileFeed::new(&source.name, location))
        };

    let has_filters = source
        .title_keyword
        .as_deref()
        .is_some_and(|k| !k.trim().is_empty())
        || !source.exclude_communities.is_empty();
    if has_filters {
        Box::new(FilteredFeed::new(
            base,
            source.title_keyword.as_deref(),
            &source.exclude_communities,
        ))
    } else {
        base
    }
}
