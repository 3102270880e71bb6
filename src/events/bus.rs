//! Checkpoint broadcast: tokio::broadcast channel for pipeline observability.
//!
//! Every checkpoint is written to `tracing` when published, then fanned out to
//! any subscribers (tests, dashboards).

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Entity batch written during one ingestion page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Events,
    Markets,
    Outcomes,
    Tags,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Events => "events",
            BatchKind::Markets => "markets",
            BatchKind::Outcomes => "outcomes",
            BatchKind::Tags => "tags",
        }
    }
}

/// Pipeline checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SyncEvent {
    /// A page of upstream events was fetched.
    PageFetched {
        page: usize,
        offset: usize,
        count: usize,
    },
    /// Pagination stopped.
    PageEnded { page: usize, reason: String },
    /// A batch upsert succeeded.
    BatchUpserted { kind: BatchKind, rows: usize },
    /// A batch upsert was rejected by the store.
    BatchFailed {
        kind: BatchKind,
        rows: usize,
        error: String,
    },
    /// A market's outcome arrays could not be zipped.
    OutcomesSkipped {
        market_id: String,
        token_ids: usize,
        labels: usize,
    },
    /// Entries on a page that could not be read as events.
    EventsDropped { page: usize, count: usize },
    /// A bulk price request failed and will be retried per token.
    PriceBatchFailed { tokens: usize, error: String },
    /// Price fetching was cancelled; remaining tokens get the fallback.
    PriceFetchCancelled { unresolved: usize },
    /// A sync run finished.
    SyncCompleted { pages: usize, total_events: usize },
    /// A sync run aborted.
    SyncFailed { page: usize, offset: usize, error: String },
}

/// Central bus for broadcasting checkpoints to all subscribers.
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Log the checkpoint and publish it to all subscribers.
    pub fn publish(&self, event: SyncEvent) {
        log_checkpoint(&event);
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

fn log_checkpoint(event: &SyncEvent) {
    match event {
        SyncEvent::PageFetched { page, offset, count } => {
            info!(page, offset, count, "fetched events page");
        }
        SyncEvent::PageEnded { page, reason } => {
            info!(page, reason = %reason, "pagination finished");
        }
        SyncEvent::BatchUpserted { kind, rows } => {
            info!(batch = kind.as_str(), rows, "batch upserted");
        }
        SyncEvent::BatchFailed { kind, rows, error } => {
            error!(batch = kind.as_str(), rows, error = %error, "batch upsert failed");
        }
        SyncEvent::OutcomesSkipped {
            market_id,
            token_ids,
            labels,
        } => {
            warn!(
                market_id = %market_id,
                token_ids,
                labels,
                "clobTokenIds and outcomes differ in length or are empty, skipping outcomes"
            );
        }
        SyncEvent::EventsDropped { page, count } => {
            warn!(page, count, "gamma entries dropped as unreadable events");
        }
        SyncEvent::PriceBatchFailed { tokens, error } => {
            warn!(tokens, error = %error, "price batch failed, retrying per token");
        }
        SyncEvent::PriceFetchCancelled { unresolved } => {
            debug!(unresolved, "price fetch cancelled");
        }
        SyncEvent::SyncCompleted {
            pages,
            total_events,
        } => {
            info!(pages, total_events, "polymarket sync complete");
        }
        SyncEvent::SyncFailed {
            page,
            offset,
            error,
        } => {
            error!(page, offset, error = %error, "polymarket sync aborted");
        }
    }
}
