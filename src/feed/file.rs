//! JSON file feed, for batches a scraper writes to disk

use super::{parse_batch, FeedError, SourceFeed};
use crate::item::Item;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// Reads a JSON item batch from a file
pub struct JsonFileFeed {
    name: String,
    path: PathBuf,
}

impl JsonFileFeed {
    /// Create a feed named `name` reading `path`
    #[must_use]
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl SourceFeed for JsonFileFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_batch(&self) -> Result<Vec<Item>, FeedError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FeedError::Missing(self.path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let items = parse_batch(&content)?;
        debug!(source = %self.name, path = %self.path.display(), count = items.len(), "Read batch file");
        Ok(items)
    }
}
