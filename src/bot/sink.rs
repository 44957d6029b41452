//! Messaging sink abstraction
//!
//! The transport behind delivery. Production uses [`super::telegram::TelegramSink`];
//! tests substitute a mock or a recorder.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Native upload call used for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMethod {
    /// Compressed photo
    Photo,
    /// GIF or silent video loop
    Animation,
    /// Streamable video
    Video,
    /// Raw file attachment
    Document,
}

impl fmt::Display for SendMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Photo => "photo",
            Self::Animation => "animation",
            Self::Video => "video",
            Self::Document => "document",
        };
        f.write_str(name)
    }
}

/// Errors returned by a sink call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Telegram rejected a photo for its dimensions (`PHOTO_INVALID_DIMENSIONS`)
    #[error("invalid photo dimensions: {0}")]
    InvalidDimensions(String),
    /// The API refused the request
    #[error("rejected: {0}")]
    Rejected(String),
    /// Transport failure or timeout
    #[error("network error: {0}")]
    Network(String),
}

/// Outbound messaging transport
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagingSink: Send + Sync {
    /// Send an HTML text message
    async fn send_text(&self, text: &str) -> Result<(), SinkError>;

    /// Upload one local file with an HTML caption
    async fn send_file(
        &self,
        method: SendMethod,
        path: &Path,
        caption: &str,
    ) -> Result<(), SinkError>;

    /// Upload images as one album, caption on the first
    async fn send_album(&self, paths: &[PathBuf], caption: &str) -> Result<(), SinkError>;
}
