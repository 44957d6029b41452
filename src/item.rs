//! Normalized feed items.
//!
//! Every source feed produces [`Item`] values; the relay only ever reads
//! them and persists nothing but their `id`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder rendered for any missing descriptive field.
pub const MISSING_FIELD: &str = "N/A";

/// How media for an item should be fetched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// One media file, `media_refs` are alternatives in priority order
    Single,
    /// A batch of still images sent as an album
    Gallery,
    /// Text-only item
    #[default]
    None,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Single => "single",
            Self::Gallery => "gallery",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// A single normalized unit of content from a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Stable, source-unique identifier
    pub id: String,
    /// Item title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Author or uploader name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Link back to the item on its source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    /// Candidate media locators, first one is primary
    #[serde(default)]
    pub media_refs: Vec<String>,
    /// Media fetch classification
    #[serde(default)]
    pub kind: MediaKind,
    /// Upvotes or a similar popularity score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    /// Community the item was posted in (e.g. a subreddit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<String>,
    /// Free-form tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Item {
    /// Create a text-only item with just an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            author: None,
            permalink: None,
            media_refs: Vec::new(),
            kind: MediaKind::None,
            score: None,
            community: None,
            tags: Vec::new(),
        }
    }

    /// Title or [`MISSING_FIELD`]
    #[must_use]
    pub fn title_or_missing(&self) -> &str {
        present_or_missing(self.title.as_deref())
    }

    /// Author or [`MISSING_FIELD`]
    #[must_use]
    pub fn author_or_missing(&self) -> &str {
        present_or_missing(self.author.as_deref())
    }

    /// Permalink or [`MISSING_FIELD`]
    #[must_use]
    pub fn permalink_or_missing(&self) -> &str {
        present_or_missing(self.permalink.as_deref())
    }
}

fn present_or_missing(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => MISSING_FIELD,
    }
}
