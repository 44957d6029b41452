//! Acquisition strategy trait
//!
//! Every way of turning a locator into a local file (plain download, host
//! specific extractor, external downloader) implements this trait and is
//! tried in order by [`super::MediaAcquirer`].

use super::{AcquiredArtifact, Unavailable};
use async_trait::async_trait;
use std::fmt;
use url::Url;

/// Why a strategy produced nothing, letting the chain continue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// The strategy does not handle this locator
    NotApplicable,
    /// The remote reported the content as gone
    NotFound,
    /// A web page came back instead of media
    Markup,
    /// Network or tool failure
    Failed(String),
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotApplicable => f.write_str("not applicable"),
            Self::NotFound => f.write_str("not found"),
            Self::Markup => f.write_str("markup instead of media"),
            Self::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

/// Result of one strategy attempt
#[derive(Debug)]
pub enum StrategyOutcome {
    /// A file was produced
    Success(AcquiredArtifact),
    /// Nothing produced; the next strategy may try
    Miss(MissReason),
    /// Definitive answer for the locator; stops the chain
    Fatal(Unavailable),
}

/// Unified interface for acquisition strategies
#[async_trait]
pub trait AcquireStrategy: Send + Sync {
    /// Strategy name for logging and artifact provenance
    fn name(&self) -> &'static str;

    /// Check if this strategy can handle the given locator
    fn applies_to(&self, url: &Url) -> bool;

    /// Try to produce a local file no larger than `max_bytes`.
    ///
    /// Implementations must not leave partial files behind on any outcome
    /// other than `Success`.
    async fn attempt(&self, url: &Url, max_bytes: u64) -> StrategyOutcome;
}
