//! Media acquisition
//!
//! Turns the media locators of an [`Item`] into local files by walking an
//! ordered chain of [`AcquireStrategy`] implementations. Every produced file
//! lives in its own scoped temporary directory that is removed when the
//! artifact is released or dropped.

pub mod classify;
pub mod direct;
pub mod redgifs;
pub mod strategy;
pub mod ytdlp;

use crate::config::{Settings, GALLERY_BATCH_CAP};
use crate::item::{Item, MediaKind};
use reqwest::Client as HttpClient;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub use classify::{classify, ContentCategory};
pub use direct::DirectFetch;
pub use redgifs::RedgifsExtractor;
pub use strategy::{AcquireStrategy, MissReason, StrategyOutcome};
pub use ytdlp::{CookieSource, YtdlpExtractor};

/// Why no media could be produced for a locator or item
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    /// The media exceeds the configured byte ceiling
    #[error("media exceeds the size ceiling")]
    TooLarge,
    /// The remote reports the media as gone
    #[error("media not found")]
    NotFound,
    /// Every strategy missed
    #[error("no acquisition strategy succeeded")]
    NoStrategySucceeded,
}

impl Unavailable {
    const fn precedence(self) -> u8 {
        match self {
            Self::TooLarge => 2,
            Self::NotFound => 1,
            Self::NoStrategySucceeded => 0,
        }
    }

    /// The more specific of two reasons; `too_large` wins over `not_found`.
    #[must_use]
    pub const fn most_specific(self, other: Self) -> Self {
        if other.precedence() > self.precedence() {
            other
        } else {
            self
        }
    }
}

/// A downloaded file owned by a scoped temporary directory
#[derive(Debug)]
pub struct AcquiredArtifact {
    dir: TempDir,
    path: PathBuf,
    declared_type: Option<String>,
    byte_size: u64,
    source: &'static str,
}

impl AcquiredArtifact {
    /// Wrap a file that lives inside `dir`.
    #[must_use]
    pub const fn new(
        dir: TempDir,
        path: PathBuf,
        declared_type: Option<String>,
        byte_size: u64,
        source: &'static str,
    ) -> Self {
        Self {
            dir,
            path,
            declared_type,
            byte_size,
            source,
        }
    }

    /// Local file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// MIME type reported by the remote or guessed from the extension
    #[must_use]
    pub fn declared_type(&self) -> Option<&str> {
        self.declared_type.as_deref()
    }

    /// Measured size in bytes
    #[must_use]
    pub const fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// Name of the strategy that produced the file
    #[must_use]
    pub const fn source(&self) -> &'static str {
        self.source
    }

    /// Delete the scoped directory now, logging a failure instead of
    /// silently ignoring it as `Drop` would.
    pub fn release(self) {
        let dir = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(dir = %dir.display(), "Released media artifact"),
            Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to remove media temp dir"),
        }
    }
}

/// Outcome of acquiring all media of one item
#[derive(Debug)]
pub enum AcquiredMedia {
    /// Text-only item, nothing was fetched
    None,
    /// Media was expected but could not be produced
    Unavailable(Unavailable),
    /// One file
    Single(AcquiredArtifact),
    /// At least one gallery image
    Gallery(Vec<AcquiredArtifact>),
}

impl AcquiredMedia {
    /// Release every artifact held
    pub fn release(self) {
        match self {
            Self::Single(artifact) => artifact.release(),
            Self::Gallery(artifacts) => artifacts.into_iter().for_each(AcquiredArtifact::release),
            Self::None | Self::Unavailable(_) => {}
        }
    }
}

/// Parent directory for scoped temp dirs and files
#[derive(Debug, Clone, Default)]
pub struct TempRoot {
    root: Option<PathBuf>,
}

impl TempRoot {
    /// Use `root`, or the system temp dir when `None`
    #[must_use]
    pub const fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// Create a fresh directory whose name starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the root or the directory cannot be created.
    pub fn create_dir(&self, prefix: &str) -> io::Result<TempDir> {
        match &self.root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                tempfile::Builder::new().prefix(prefix).tempdir_in(root)
            }
            None => tempfile::Builder::new().prefix(prefix).tempdir(),
        }
    }

    /// Create a fresh file whose name starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the root or the file cannot be created.
    pub fn create_file(&self, prefix: &str, suffix: &str) -> io::Result<NamedTempFile> {
        match &self.root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                tempfile::Builder::new()
                    .prefix(prefix)
                    .suffix(suffix)
                    .tempfile_in(root)
            }
            None => tempfile::Builder::new()
                .prefix(prefix)
                .suffix(suffix)
                .tempfile(),
        }
    }
}

/// Ordered chain of acquisition strategies with a byte ceiling
pub struct MediaAcquirer {
    strategies: Vec<Box<dyn AcquireStrategy>>,
    max_bytes: u64,
}

impl MediaAcquirer {
    /// Chain `strategies` in the given order.
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn AcquireStrategy>>, max_bytes: u64) -> Self {
        Self {
            strategies,
            max_bytes,
        }
    }

    /// Build the standard chain: direct fetch, then Redgifs, then yt-dlp,
    /// each extractor only when enabled.
    #[must_use]
    pub fn from_settings(settings: &Settings, client: &HttpClient) -> Self {
        let temp_root = TempRoot::new(settings.media_temp_path());
        let mut strategies: Vec<Box<dyn AcquireStrategy>> =
            vec![Box::new(DirectFetch::new(client.clone(), temp_root.clone()))];

        if settings.allow_redgifs {
            strategies.push(Box::new(RedgifsExtractor::new(
                client.clone(),
                &settings.redgifs_api_base,
                settings.probe_timeout(),
                temp_root.clone(),
            )));
        }
        if settings.allow_ytdlp {
            let cookies = CookieSource::from_settings(
                settings.ytdlp_cookies_path.as_deref(),
                settings.ytdlp_cookies_content.as_deref(),
            );
            strategies.push(Box::new(YtdlpExtractor::new(
                &settings.ytdlp_binary,
                cookies,
                settings.extractor_timeout(),
                temp_root,
            )));
        }

        let acquirer = Self::new(strategies, settings.media_max_bytes);
        info!(
            strategies = ?acquirer.strategy_names(),
            max_bytes = acquirer.max_bytes,
            "Media acquirer ready"
        );
        acquirer
    }

    /// Names of the chained strategies, in order
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Byte ceiling applied to every attempt
    #[must_use]
    pub const fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Acquire one locator by walking the strategy chain.
    ///
    /// Stops at the first success or at a definitive answer such as a size
    /// ceiling violation.
    ///
    /// # Errors
    ///
    /// Returns the reason no artifact could be produced.
    pub async fn acquire(&self, locator: &str) -> Result<AcquiredArtifact, Unavailable> {
        let url = match Url::parse(locator.trim()) {
            Ok(url) => url,
            Err(e) => {
                warn!(url = %locator, error = %e, "Unparseable media locator");
                return Err(Unavailable::NotFound);
            }
        };

        let mut saw_not_found = false;
        for strategy in &self.strategies {
            if !strategy.applies_to(&url) {
                continue;
            }
            match strategy.attempt(&url, self.max_bytes).await {
                StrategyOutcome::Success(artifact) => {
                    info!(
                        url = %url,
                        strategy = strategy.name(),
                        bytes = artifact.byte_size(),
                        "Media acquired"
                    );
                    return Ok(artifact);
                }
                StrategyOutcome::Fatal(reason) => {
                    info!(url = %url, strategy = strategy.name(), reason = %reason, "Media unavailable");
                    return Err(reason);
                }
                StrategyOutcome::Miss(reason) => {
                    debug!(url = %url, strategy = strategy.name(), reason = %reason, "Strategy missed");
                    saw_not_found |= reason == MissReason::NotFound;
                }
            }
        }

        if saw_not_found {
            Err(Unavailable::NotFound)
        } else {
            Err(Unavailable::NoStrategySucceeded)
        }
    }

    /// Acquire the media of `item` according to its kind.
    pub async fn acquire_item(&self, item: &Item) -> AcquiredMedia {
        if item.kind == MediaKind::None {
            return AcquiredMedia::None;
        }
        if item.media_refs.is_empty() {
            warn!(item_id = %item.id, kind = %item.kind, "Media item has no locators");
            return AcquiredMedia::Unavailable(Unavailable::NotFound);
        }

        match item.kind {
            MediaKind::Single => self.acquire_single(item).await,
            MediaKind::Gallery => self.acquire_gallery(item).await,
            MediaKind::None => AcquiredMedia::None,
        }
    }

    async fn acquire_single(&self, item: &Item) -> AcquiredMedia {
        let mut reason = Unavailable::NoStrategySucceeded;
        for locator in &item.media_refs {
            match self.acquire(locator).await {
                Ok(artifact) => return AcquiredMedia::Single(artifact),
                Err(e) => reason = reason.most_specific(e),
            }
        }
        AcquiredMedia::Unavailable(reason)
    }

    async fn acquire_gallery(&self, item: &Item) -> AcquiredMedia {
        if item.media_refs.len() > GALLERY_BATCH_CAP {
            debug!(
                item_id = %item.id,
                total = item.media_refs.len(),
                cap = GALLERY_BATCH_CAP,
                "Gallery truncated to batch cap"
            );
        }

        let mut artifacts = Vec::new();
        let mut reason = Unavailable::NoStrategySucceeded;
        for locator in item.media_refs.iter().take(GALLERY_BATCH_CAP) {
            match self.acquire(locator).await {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => reason = reason.most_specific(e),
            }
        }

        if artifacts.is_empty() {
            AcquiredMedia::Unavailable(reason)
        } else {
            AcquiredMedia::Gallery(artifacts)
        }
    }
}
