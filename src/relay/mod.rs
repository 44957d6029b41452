//! Relay orchestration
//!
//! One run per source: load the seen store, fetch and filter the batch,
//! deliver fresh items oldest first, and persist progress after every
//! successful delivery so a crash never re-sends delivered items.

use crate::bot::DeliveryRouter;
use crate::feed::{FeedError, SourceFeed};
use crate::item::Item;
use crate::media::MediaAcquirer;
use crate::storage::{write_snapshot, SeenStore, StatePaths, StoreError};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors surfaced by a relay run
#[derive(Error, Debug)]
pub enum RelayError {
    /// The source feed failed; the run stops
    #[error("feed '{feed}' unavailable: {error}")]
    FeedUnavailable {
        /// Source name
        feed: String,
        /// Underlying feed failure
        #[source]
        error: FeedError,
    },
    /// Every delivery path failed for an item; it stays unmarked
    #[error("delivery failed for item {0}")]
    DeliveryFailed(String),
    /// The seen file was unreadable and has been moved aside
    #[error("seen store corrupt, moved to {0}")]
    StateCorrupt(String),
    /// Writing the seen store or snapshot failed
    #[error("failed to persist state: {0}")]
    StatePersistFailed(#[from] StoreError),
}

/// Phases of a run, used in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Not running
    Idle,
    /// Opening the seen store
    LoadingSeen,
    /// Fetching and filtering the batch
    Filtering,
    /// Delivering fresh items
    Sending,
    /// Writing the batch snapshot
    Persisting,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::LoadingSeen => "loading_seen",
            Self::Filtering => "filtering",
            Self::Sending => "sending",
            Self::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// Counters for one source run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Source name
    pub source: String,
    /// Items in the fetched batch
    pub fetched: usize,
    /// Items not seen before
    pub fresh: usize,
    /// Items delivered and marked
    pub delivered: usize,
    /// Ids whose delivery failed, retried next run
    pub failed: Vec<String>,
}

/// Unseen items of `batch`, first occurrence of each id, oldest first.
///
/// Feeds list newest first, so the filtered batch is reversed.
#[must_use]
pub fn select_fresh<'a>(batch: &'a [Item], store: &SeenStore) -> Vec<&'a Item> {
    let mut taken: HashSet<&str> = HashSet::new();
    let mut fresh = Vec::new();
    for item in batch {
        if store.contains(&item.id) || !taken.insert(item.id.as_str()) {
            continue;
        }
        fresh.push(item);
    }
    fresh.reverse();
    fresh
}

/// Drives acquisition and delivery for one source at a time
pub struct Relay {
    acquirer: MediaAcquirer,
    router: DeliveryRouter,
    send_delay: Duration,
    seen_max_entries: usize,
}

impl Relay {
    /// Assemble a relay
    #[must_use]
    pub const fn new(
        acquirer: MediaAcquirer,
        router: DeliveryRouter,
        send_delay: Duration,
        seen_max_entries: usize,
    ) -> Self {
        Self {
            acquirer,
            router,
            send_delay,
            seen_max_entries,
        }
    }

    /// Run one pass over `feed`, keeping state under `paths`.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::FeedUnavailable` if the batch cannot be fetched.
    /// Delivery and persistence failures are logged and counted instead.
    pub async fn run(
        &self,
        feed: &dyn SourceFeed,
        paths: &StatePaths,
    ) -> Result<RunReport, RelayError> {
        let source = feed.name().to_string();
        let mut report = RunReport {
            source: source.clone(),
            ..RunReport::default()
        };

        log_phase(&source, RunPhase::LoadingSeen);
        let mut store = SeenStore::load(&paths.seen, self.seen_max_entries);
        if let Some(moved) = store.quarantined() {
            let e = RelayError::StateCorrupt(moved.display().to_string());
            warn!(source = %source, error = %e, "Recovered from corrupt seen store");
        }

        log_phase(&source, RunPhase::Filtering);
        let batch = feed
            .fetch_batch()
            .await
            .map_err(|error| RelayError::FeedUnavailable {
                feed: source.clone(),
                error,
            })?;
        let fresh = select_fresh(&batch, &store);
        report.fetched = batch.len();
        report.fresh = fresh.len();
        info!(
            source = %source,
            fetched = report.fetched,
            fresh = report.fresh,
            seen = store.len(),
            "Batch filtered"
        );

        log_phase(&source, RunPhase::Sending);
        for (index, item) in fresh.iter().enumerate() {
            if index > 0 && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
            if self.relay_item(item, &mut store).await {
                report.delivered += 1;
            } else {
                report.failed.push(item.id.clone());
            }
        }

        log_phase(&source, RunPhase::Persisting);
        if let Err(e) = write_snapshot(&paths.snapshot, &batch) {
            let e = RelayError::from(e);
            error!(source = %source, path = %paths.snapshot.display(), error = %e, "Snapshot not written");
        }
        if !paths.seen.exists() {
            if let Err(e) = store.flush() {
                let e = RelayError::from(e);
                error!(source = %source, error = %e, "Could not create seen store");
            }
        }

        log_phase(&source, RunPhase::Idle);
        info!(
            source = %source,
            delivered = report.delivered,
            failed = report.failed.len(),
            "Run finished"
        );
        Ok(report)
    }

    async fn relay_item(&self, item: &Item, store: &mut SeenStore) -> bool {
        debug!(item_id = %item.id, kind = %item.kind, refs = item.media_refs.len(), "Relaying item");
        let media = self.acquirer.acquire_item(item).await;
        if !self.router.deliver(item, media).await {
            let e = RelayError::DeliveryFailed(item.id.clone());
            error!(item_id = %item.id, error = %e, "Item left unmarked for the next run");
            return false;
        }

        store.mark(&item.id);
        if let Err(e) = store.flush() {
            let e = RelayError::from(e);
            error!(item_id = %item.id, error = %e, "Delivered item not persisted");
        }
        true
    }
}

fn log_phase(source: &str, phase: RunPhase) {
    debug!(source = %source, phase = %phase, "Relay phase");
}
