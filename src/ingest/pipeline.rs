//! Paginated Gamma → store sync.
//!
//! Pages are fetched sequentially from offset 0. Each page is transformed and
//! written in dependency order: events, markets, outcomes, tag links. Pagination
//! stops on a non-array payload, an empty page, or a short page.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use super::gamma::EventPageSource;
use super::transform::{transform_page, PageBatch};
use crate::config::UpsertPolicy;
use crate::db::store::CatalogStore;
use crate::error::{CatalogError, Result, StoreError, SyncError};
use crate::events::bus::{BatchKind, EventBus, SyncEvent};

pub struct SyncPipeline {
    source: Arc<dyn EventPageSource>,
    store: Arc<dyn CatalogStore>,
    bus: Arc<EventBus>,
    page_limit: usize,
    policy: UpsertPolicy,
}

impl SyncPipeline {
    pub fn new(
        source: Arc<dyn EventPageSource>,
        store: Arc<dyn CatalogStore>,
        bus: Arc<EventBus>,
        page_limit: usize,
        policy: UpsertPolicy,
    ) -> Self {
        Self {
            source,
            store,
            bus,
            page_limit: page_limit.max(1),
            policy,
        }
    }

    /// Run one full sync. Returns the number of upstream events seen across
    /// all pages, whether or not each one was stored.
    pub async fn run(&self) -> Result<usize> {
        info!(page_limit = self.page_limit, policy = ?self.policy, "starting polymarket sync");

        let mut offset = 0;
        let mut page = 0;
        let mut total_events = 0;

        loop {
            page += 1;

            let payload = match self.source.fetch_page(offset, self.page_limit).await {
                Ok(payload) => payload,
                Err(e) => {
                    self.bus.publish(SyncEvent::SyncFailed {
                        page,
                        offset,
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            };

            let raw_events = match payload {
                Value::Array(items) => items,
                other => {
                    warn!(page, offset, kind = json_kind(&other), "gamma page was not an array");
                    self.end(page, "non-array payload");
                    break;
                }
            };

            if raw_events.is_empty() {
                self.end(page, "empty page");
                break;
            }

            let count = raw_events.len();
            total_events += count;
            self.bus.publish(SyncEvent::PageFetched { page, offset, count });

            let batch = transform_page(&raw_events);
            if batch.dropped_events > 0 {
                self.bus.publish(SyncEvent::EventsDropped {
                    page,
                    count: batch.dropped_events,
                });
            }
            if let Err(e) = self.write_page(batch).await {
                self.bus.publish(SyncEvent::SyncFailed {
                    page,
                    offset,
                    error: e.to_string(),
                });
                return Err(e);
            }

            if count < self.page_limit {
                self.end(page, "short page");
                break;
            }
            offset += self.page_limit;
        }

        self.bus.publish(SyncEvent::SyncCompleted {
            pages: page,
            total_events,
        });
        Ok(total_events)
    }

    fn end(&self, page: usize, reason: &str) {
        self.bus.publish(SyncEvent::PageEnded {
            page,
            reason: reason.to_string(),
        });
    }

    async fn write_page(&self, batch: PageBatch) -> Result<()> {
        for skipped in batch.skipped_outcomes {
            self.bus.publish(SyncEvent::OutcomesSkipped {
                market_id: skipped.market_id,
                token_ids: skipped.token_ids,
                labels: skipped.labels,
            });
        }

        let store = &self.store;
        self.write(BatchKind::Events, batch.events.len(), store.upsert_events(&batch.events))
            .await?;
        self.write(BatchKind::Markets, batch.markets.len(), store.upsert_markets(&batch.markets))
            .await?;
        self.write(
            BatchKind::Outcomes,
            batch.outcomes.len(),
            store.upsert_outcomes(&batch.outcomes),
        )
        .await?;
        self.write(BatchKind::Tags, batch.tags.len(), store.insert_event_tags(&batch.tags))
            .await?;
        Ok(())
    }

    /// Await one batch write and apply the upsert policy to its failure.
    /// Empty batches are never sent.
    async fn write<F>(&self, kind: BatchKind, rows: usize, op: F) -> Result<()>
    where
        F: Future<Output = std::result::Result<u64, StoreError>>,
    {
        if rows == 0 {
            return Ok(());
        }

        match op.await {
            Ok(_) => {
                self.bus.publish(SyncEvent::BatchUpserted { kind, rows });
                Ok(())
            }
            Err(e) => {
                self.bus.publish(SyncEvent::BatchFailed {
                    kind,
                    rows,
                    error: e.to_string(),
                });
                match (&e, self.policy) {
                    (StoreError::Rejected(_), UpsertPolicy::BestEffort) => Ok(()),
                    _ => Err(CatalogError::Store(e)),
                }
            }
        }
    }
}

/// Run a sync for the cron endpoint. A run that saw no events at all is an
/// upstream failure.
pub async fn trigger_sync(pipeline: &SyncPipeline) -> std::result::Result<usize, SyncError> {
    let total = pipeline.run().await?;
    if total == 0 {
        return Err(SyncError::NoEvents);
    }
    Ok(total)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves a fixed list of pages by offset; anything past the end is `[]`.
    struct PagedSource {
        pages: Vec<Value>,
        limit: usize,
        requested: Mutex<Vec<usize>>,
        fail_at: Option<usize>,
    }

    impl PagedSource {
        fn new(pages: Vec<Value>, limit: usize) -> Self {
            Self {
                pages,
                limit,
                requested: Mutex::new(Vec::new()),
                fail_at: None,
            }
        }

        fn requested(&self) -> Vec<usize> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventPageSource for PagedSource {
        async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Value> {
            assert_eq!(limit, self.limit);
            self.requested.lock().unwrap().push(offset);
            if self.fail_at == Some(offset) {
                return Err(CatalogError::Upstream("Gamma API returned 503".into()));
            }
            Ok(self
                .pages
                .get(offset / limit)
                .cloned()
                .unwrap_or_else(|| json!([])))
        }
    }

    fn event(id: i64) -> Value {
        json!({
            "id": id.to_string(),
            "slug": format!("event-{id}"),
            "title": format!("Event {id}"),
            "active": true,
            "createdAt": "2024-06-01T00:00:00Z",
            "updatedAt": "2024-06-01T00:00:00Z",
            "markets": [{
                "id": (id * 10).to_string(),
                "conditionId": format!("0xc{id}"),
                "question": format!("Market {id}?"),
                "slug": format!("market-{id}"),
                "active": true,
                "closed": false,
                "volume": "100",
                "outcomes": "[\"Yes\", \"No\"]",
                "clobTokenIds": format!("[\"{id}-yes\", \"{id}-no\"]"),
                "createdAt": "2024-06-01T00:00:00Z",
                "updatedAt": "2024-06-01T00:00:00Z"
            }],
            "tags": [{ "id": "1", "slug": "politics" }]
        })
    }

    fn page(ids: std::ops::Range<i64>) -> Value {
        Value::Array(ids.map(event).collect())
    }

    fn pipeline(
        source: Arc<PagedSource>,
        store: Arc<MemoryStore>,
        policy: UpsertPolicy,
    ) -> SyncPipeline {
        SyncPipeline::new(source, store, Arc::new(EventBus::default()), 2, policy)
    }

    #[tokio::test]
    async fn stops_after_short_page_without_requesting_further() {
        let source = Arc::new(PagedSource::new(vec![page(1..3), page(3..5), page(5..6)], 2));
        let store = Arc::new(MemoryStore::new());

        let total = pipeline(source.clone(), store.clone(), UpsertPolicy::BestEffort)
            .run()
            .await
            .unwrap();

        assert_eq!(total, 5);
        assert_eq!(source.requested(), vec![0, 2, 4]);

        let state = store.snapshot();
        assert_eq!(state.events.len(), 5);
        assert_eq!(state.markets.len(), 5);
        assert_eq!(state.outcomes.len(), 10);
        assert_eq!(state.outcomes["3-no"].outcome_index, Some(1));
    }

    #[tokio::test]
    async fn stops_on_empty_page() {
        let source = Arc::new(PagedSource::new(vec![page(1..3)], 2));
        let store = Arc::new(MemoryStore::new());

        let total = pipeline(source.clone(), store, UpsertPolicy::BestEffort)
            .run()
            .await
            .unwrap();

        assert_eq!(total, 2);
        assert_eq!(source.requested(), vec![0, 2]);
    }

    #[tokio::test]
    async fn stops_on_non_array_payload() {
        let source = Arc::new(PagedSource::new(vec![json!({ "error": "rate limited" })], 2));
        let store = Arc::new(MemoryStore::new());

        let total = pipeline(source.clone(), store.clone(), UpsertPolicy::BestEffort)
            .run()
            .await
            .unwrap();

        assert_eq!(total, 0);
        assert!(store.write_calls().is_empty());
    }

    #[tokio::test]
    async fn batches_are_written_in_dependency_order() {
        let source = Arc::new(PagedSource::new(vec![page(1..2)], 2));
        let store = Arc::new(MemoryStore::new());

        pipeline(source, store.clone(), UpsertPolicy::BestEffort)
            .run()
            .await
            .unwrap();

        assert_eq!(
            store.write_calls(),
            vec![BatchKind::Events, BatchKind::Markets, BatchKind::Outcomes, BatchKind::Tags]
        );
    }

    #[tokio::test]
    async fn rerunning_with_same_upstream_leaves_same_rows() {
        let source = Arc::new(PagedSource::new(vec![page(1..3), page(3..4)], 2));
        let store = Arc::new(MemoryStore::new());
        let sync = pipeline(source, store.clone(), UpsertPolicy::BestEffort);

        sync.run().await.unwrap();
        let first = store.snapshot();
        sync.run().await.unwrap();
        let second = store.snapshot();

        assert_eq!(first.events, second.events);
        assert_eq!(first.markets, second.markets);
        assert_eq!(first.outcomes, second.outcomes);
        assert_eq!(first.event_tags, second.event_tags);
        assert_eq!(second.event_tags.len(), 3);
    }

    #[tokio::test]
    async fn rerun_adds_no_tag_pairs() {
        let mut raw = event(1);
        raw["tags"] = json!([{ "id": "2", "slug": "politics" }, { "id": "3", "slug": "elections" }]);
        let source = Arc::new(PagedSource::new(vec![Value::Array(vec![raw])], 2));
        let store = Arc::new(MemoryStore::new());
        let sync = pipeline(source, store.clone(), UpsertPolicy::BestEffort);

        sync.run().await.unwrap();
        assert_eq!(store.snapshot().event_tags.len(), 2);
        sync.run().await.unwrap();
        assert_eq!(store.snapshot().event_tags.len(), 2);
    }

    #[tokio::test]
    async fn missing_created_at_keeps_the_stored_value() {
        let dated = Arc::new(PagedSource::new(vec![page(1..2)], 2));
        let store = Arc::new(MemoryStore::new());
        pipeline(dated, store.clone(), UpsertPolicy::BestEffort)
            .run()
            .await
            .unwrap();
        let stored = store.snapshot().events[&1].created_at;

        let mut undated = event(1);
        undated.as_object_mut().unwrap().remove("createdAt");
        undated["markets"][0].as_object_mut().unwrap().remove("createdAt");
        let source = Arc::new(PagedSource::new(vec![Value::Array(vec![undated])], 2));
        pipeline(source, store.clone(), UpsertPolicy::BestEffort)
            .run()
            .await
            .unwrap();

        let state = store.snapshot();
        assert_eq!(state.events[&1].created_at, stored);
        assert_eq!(state.markets[&10].created_at, stored);
    }

    #[tokio::test]
    async fn html_page_body_ends_the_run_without_events() {
        let body = crate::ingest::gamma::decode_page(b"<html>maintenance</html>");
        let source = Arc::new(PagedSource::new(vec![body], 2));
        let store = Arc::new(MemoryStore::new());
        let sync = pipeline(source.clone(), store.clone(), UpsertPolicy::BestEffort);

        assert_eq!(sync.run().await.unwrap(), 0);
        assert_eq!(source.requested(), vec![0]);
        assert!(store.write_calls().is_empty());
        assert!(matches!(trigger_sync(&sync).await, Err(SyncError::NoEvents)));
    }

    #[tokio::test]
    async fn unreadable_entries_are_reported() {
        let mut broken = event(2);
        broken["markets"] = json!("not a list");
        let source = Arc::new(PagedSource::new(vec![Value::Array(vec![event(1), broken])], 2));
        let store = Arc::new(MemoryStore::new());

        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let sync = SyncPipeline::new(source, store.clone(), bus, 2, UpsertPolicy::BestEffort);

        assert_eq!(sync.run().await.unwrap(), 2);
        assert_eq!(store.snapshot().events.len(), 1);

        let mut dropped = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SyncEvent::EventsDropped { page, count } = event {
                dropped.push((page, count));
            }
        }
        assert_eq!(dropped, vec![(1, 1)]);
    }

    #[tokio::test]
    async fn best_effort_continues_past_rejected_batch() {
        let source = Arc::new(PagedSource::new(vec![page(1..3), page(3..4)], 2));
        let store = Arc::new(MemoryStore::new());
        store.reject(BatchKind::Markets);

        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let sync = SyncPipeline::new(source, store.clone(), bus, 2, UpsertPolicy::BestEffort);

        let total = sync.run().await.unwrap();
        assert_eq!(total, 3);

        let state = store.snapshot();
        assert_eq!(state.events.len(), 3);
        assert!(state.markets.is_empty());
        assert_eq!(state.outcomes.len(), 6);

        let mut failures = 0;
        while let Ok(event) = rx.try_recv() {
            if let SyncEvent::BatchFailed { kind, .. } = event {
                assert_eq!(kind, BatchKind::Markets);
                failures += 1;
            }
        }
        assert_eq!(failures, 2);
    }

    #[tokio::test]
    async fn fail_fast_aborts_on_rejected_batch() {
        let source = Arc::new(PagedSource::new(vec![page(1..3), page(3..4)], 2));
        let store = Arc::new(MemoryStore::new());
        store.reject(BatchKind::Markets);

        let err = pipeline(source.clone(), store.clone(), UpsertPolicy::FailFast)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Store(StoreError::Rejected(_))));
        assert_eq!(source.requested(), vec![0]);
        assert_eq!(store.write_calls(), vec![BatchKind::Events, BatchKind::Markets]);
    }

    #[tokio::test]
    async fn unavailable_store_aborts_under_any_policy() {
        let source = Arc::new(PagedSource::new(vec![page(1..3)], 2));
        let store = Arc::new(MemoryStore::new());
        store.go_offline();

        let err = pipeline(source, store, UpsertPolicy::BestEffort)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn fetch_failure_aborts_the_run() {
        let mut source = PagedSource::new(vec![page(1..3), page(3..5)], 2);
        source.fail_at = Some(2);
        let source = Arc::new(source);
        let store = Arc::new(MemoryStore::new());

        let err = pipeline(source.clone(), store.clone(), UpsertPolicy::BestEffort)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Upstream(_)));
        assert_eq!(source.requested(), vec![0, 2]);
        // the first page stays committed
        assert_eq!(store.snapshot().events.len(), 2);
    }

    #[tokio::test]
    async fn trigger_reports_no_events() {
        let source = Arc::new(PagedSource::new(vec![], 2));
        let store = Arc::new(MemoryStore::new());
        let sync = pipeline(source, store, UpsertPolicy::BestEffort);

        assert!(matches!(trigger_sync(&sync).await, Err(SyncError::NoEvents)));
    }

    #[tokio::test]
    async fn trigger_returns_event_count() {
        let source = Arc::new(PagedSource::new(vec![page(1..2)], 2));
        let store = Arc::new(MemoryStore::new());
        let sync = pipeline(source, store, UpsertPolicy::BestEffort);

        assert_eq!(trigger_sync(&sync).await.unwrap(), 1);
    }
}
