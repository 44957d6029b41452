//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use feed_relay::bot::{MessagingSink, SendMethod, SinkError};
use feed_relay::feed::{FeedError, SourceFeed};
use feed_relay::item::Item;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00,
];
pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];
pub const MP4: &[u8] = b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00mp42isom";

/// Serve `router` on an ephemeral local port
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    addr
}

/// Number of entries directly under `dir` (0 when missing)
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map_or(0, |entries| entries.count())
}

/// One call observed by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text(String),
    File {
        method: SendMethod,
        caption: String,
        bytes: usize,
    },
    Album {
        count: usize,
        caption: String,
    },
}

/// Sink recording calls; optionally rejects every call
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Sent>>,
    fail_all: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_all: true,
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("sink lock").clone()
    }

    fn record(&self, entry: Sent) -> Result<(), SinkError> {
        if self.fail_all {
            return Err(SinkError::Network("sink offline".to_string()));
        }
        self.sent.lock().expect("sink lock").push(entry);
        Ok(())
    }
}

#[async_trait]
impl MessagingSink for RecordingSink {
    async fn send_text(&self, text: &str) -> Result<(), SinkError> {
        self.record(Sent::Text(text.to_string()))
    }

    async fn send_file(
        &self,
        method: SendMethod,
        path: &Path,
        caption: &str,
    ) -> Result<(), SinkError> {
        let bytes = std::fs::read(path).map_or(0, |b| b.len());
        self.record(Sent::File {
            method,
            caption: caption.to_string(),
            bytes,
        })
    }

    async fn send_album(&self, paths: &[PathBuf], caption: &str) -> Result<(), SinkError> {
        self.record(Sent::Album {
            count: paths.len(),
            caption: caption.to_string(),
        })
    }
}

/// Feed returning a fixed batch, or an error when `None`
pub struct StaticFeed {
    pub name: String,
    pub items: Option<Vec<Item>>,
}

impl StaticFeed {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            name: "test".to_string(),
            items: Some(items),
        }
    }

    pub fn broken() -> Self {
        Self {
            name: "test".to_string(),
            items: None,
        }
    }
}

#[async_trait]
impl SourceFeed for StaticFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_batch(&self) -> Result<Vec<Item>, FeedError> {
        self.items
            .clone()
            .ok_or_else(|| FeedError::Missing("new.json".to_string()))
    }
}

/// Text-only item
pub fn text_item(id: &str) -> Item {
    let mut item = Item::new(id);
    item.title = Some(id.to_string());
    item
}
