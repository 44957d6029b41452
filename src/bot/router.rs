//! Delivery routing
//!
//! Picks the sink call for each content category, applies the per-category
//! fallback and, as a last resort, posts the item as a text message.

use super::caption::{media_caption, text_message};
use super::sink::{MessagingSink, SendMethod, SinkError};
use crate::item::Item;
use crate::media::{classify, AcquiredArtifact, AcquiredMedia, ContentCategory};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes acquired media to the messaging sink
pub struct DeliveryRouter {
    sink: Arc<dyn MessagingSink>,
}

impl DeliveryRouter {
    /// Create a router over `sink`
    #[must_use]
    pub fn new(sink: Arc<dyn MessagingSink>) -> Self {
        Self { sink }
    }

    /// Deliver `item` with its media.
    ///
    /// Returns `false` only when every applicable call, including the text
    /// fallback, failed. Artifacts are released before returning.
    pub async fn deliver(&self, item: &Item, media: AcquiredMedia) -> bool {
        let sent = match &media {
            AcquiredMedia::None => false,
            AcquiredMedia::Unavailable(reason) => {
                info!(item_id = %item.id, reason = %reason, "Media unavailable, sending text");
                false
            }
            AcquiredMedia::Single(artifact) => {
                self.send_artifact(item, artifact, &media_caption(item)).await
            }
            AcquiredMedia::Gallery(artifacts) => match artifacts.as_slice() {
                [single] => self.send_artifact(item, single, &media_caption(item)).await,
                many => self.send_gallery(item, many).await,
            },
        };
        media.release();

        if sent {
            return true;
        }
        self.send_text(item).await
    }

    async fn send_artifact(&self, item: &Item, artifact: &AcquiredArtifact, caption: &str) -> bool {
        let category = classify(artifact).await;
        let (primary, fallback) = match category {
            ContentCategory::Image => (SendMethod::Photo, Some(SendMethod::Document)),
            ContentCategory::AnimatedImage => (SendMethod::Animation, Some(SendMethod::Document)),
            ContentCategory::Video => (SendMethod::Video, None),
            ContentCategory::Document => (SendMethod::Document, None),
        };
        debug!(
            item_id = %item.id,
            category = %category,
            strategy = artifact.source(),
            bytes = artifact.byte_size(),
            "Routing artifact"
        );

        let error = match self.sink.send_file(primary, artifact.path(), caption).await {
            Ok(()) => {
                info!(item_id = %item.id, method = %primary, "Delivered media");
                return true;
            }
            Err(e) => e,
        };
        match &error {
            SinkError::InvalidDimensions(detail) => warn!(
                item_id = %item.id,
                detail = %detail,
                "Photo rejected for its dimensions"
            ),
            other => warn!(item_id = %item.id, method = %primary, error = %other, "Send failed"),
        }

        let Some(fallback) = fallback else {
            return false;
        };
        match self.sink.send_file(fallback, artifact.path(), caption).await {
            Ok(()) => {
                info!(item_id = %item.id, method = %fallback, "Delivered media via fallback");
                true
            }
            Err(e) => {
                warn!(item_id = %item.id, method = %fallback, error = %e, "Fallback send failed");
                false
            }
        }
    }

    async fn send_gallery(&self, item: &Item, artifacts: &[AcquiredArtifact]) -> bool {
        let caption = media_caption(item);
        let paths: Vec<PathBuf> = artifacts.iter().map(|a| a.path().to_path_buf()).collect();

        match self.sink.send_album(&paths, &caption).await {
            Ok(()) => {
                info!(item_id = %item.id, images = paths.len(), "Delivered album");
                return true;
            }
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Album rejected, sending images one by one");
            }
        }

        let mut sent = 0usize;
        for artifact in artifacts {
            let caption = if sent == 0 { caption.as_str() } else { "" };
            if self.send_artifact(item, artifact, caption).await {
                sent += 1;
            }
        }
        info!(item_id = %item.id, sent, total = artifacts.len(), "Per-image gallery delivery");
        sent > 0
    }

    async fn send_text(&self, item: &Item) -> bool {
        match self.sink.send_text(&text_message(item)).await {
            Ok(()) => {
                info!(item_id = %item.id, "Delivered text message");
                true
            }
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Text delivery failed");
                false
            }
        }
    }
}
