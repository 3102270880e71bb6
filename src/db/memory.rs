//! In-memory `CatalogStore` used by unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use super::models::*;
use super::store::CatalogStore;
use crate::error::StoreError;
use crate::events::bus::BatchKind;

/// Stand-in for `now()` so repeated runs stay comparable.
fn fallback_ts() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemoryState {
    pub events: BTreeMap<i64, DbEvent>,
    pub markets: BTreeMap<i64, DbMarket>,
    pub outcomes: BTreeMap<String, DbOutcome>,
    pub event_tags: Vec<EventTagRecord>,
    /// tag id → slug
    pub tags: HashMap<i64, String>,
    /// (user_id, event_id)
    pub bookmarks: HashSet<(String, i64)>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    rejected: Mutex<HashSet<BatchKind>>,
    unavailable: Mutex<bool>,
    write_calls: Mutex<Vec<BatchKind>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MemoryState {
        self.state.lock().unwrap().clone()
    }

    /// Make every write of `kind` fail with `StoreError::Rejected`.
    pub fn reject(&self, kind: BatchKind) {
        self.rejected.lock().unwrap().insert(kind);
    }

    /// Make every call fail with `StoreError::Unavailable`.
    pub fn go_offline(&self) {
        *self.unavailable.lock().unwrap() = true;
    }

    pub fn write_calls(&self) -> Vec<BatchKind> {
        self.write_calls.lock().unwrap().clone()
    }

    pub fn add_tag(&self, id: i64, slug: &str) {
        self.state.lock().unwrap().tags.insert(id, slug.to_string());
    }

    pub fn add_bookmark(&self, user_id: &str, event_id: i64) {
        self.state
            .lock()
            .unwrap()
            .bookmarks
            .insert((user_id.to_string(), event_id));
    }

    pub fn insert_event_row(&self, row: DbEvent) {
        self.state.lock().unwrap().events.insert(row.id, row);
    }

    pub fn insert_market_row(&self, row: DbMarket) {
        self.state.lock().unwrap().markets.insert(row.id, row);
    }

    pub fn insert_outcome_row(&self, row: DbOutcome) {
        self.state
            .lock()
            .unwrap()
            .outcomes
            .insert(row.token_id.clone(), row);
    }

    fn check_write(&self, kind: BatchKind) -> Result<(), StoreError> {
        self.check_online()?;
        self.write_calls.lock().unwrap().push(kind);
        if self.rejected.lock().unwrap().contains(&kind) {
            return Err(StoreError::Rejected(format!("{} batch rejected", kind.as_str())));
        }
        Ok(())
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if *self.unavailable.lock().unwrap() {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn upsert_events(&self, rows: &[EventRecord]) -> Result<u64, StoreError> {
        self.check_write(BatchKind::Events)?;
        let mut state = self.state.lock().unwrap();
        for e in rows {
            let created_at = e
                .created_at
                .or_else(|| state.events.get(&e.id).map(|old| old.created_at))
                .unwrap_or_else(fallback_ts);
            state.events.insert(
                e.id,
                DbEvent {
                    id: e.id,
                    slug: e.slug.clone(),
                    title: e.title.clone(),
                    icon_url: e.icon_url.clone(),
                    rules: e.rules.clone(),
                    status: e.status.as_str().to_string(),
                    show_market_icons: e.show_market_icons,
                    enable_neg_risk: e.enable_neg_risk,
                    neg_risk_augmented: e.neg_risk_augmented,
                    neg_risk: e.neg_risk,
                    neg_risk_market_id: e.neg_risk_market_id.clone(),
                    active_markets_count: e.active_markets_count,
                    total_markets_count: e.total_markets_count,
                    end_date: e.end_date,
                    created_at,
                    updated_at: e.updated_at.unwrap_or_else(fallback_ts),
                },
            );
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_markets(&self, rows: &[MarketRecord]) -> Result<u64, StoreError> {
        self.check_write(BatchKind::Markets)?;
        let mut state = self.state.lock().unwrap();
        for m in rows {
            let old = state.markets.get(&m.id);
            let short_title = old.and_then(|old| old.short_title.clone());
            let created_at = m
                .created_at
                .or_else(|| old.map(|old| old.created_at))
                .unwrap_or_else(fallback_ts);
            state.markets.insert(
                m.id,
                DbMarket {
                    id: m.id,
                    event_id: m.event_id,
                    condition_id: m.condition_id.clone(),
                    title: m.title.clone(),
                    slug: m.slug.clone(),
                    short_title,
                    question: m.question.clone(),
                    rules: m.rules.clone(),
                    resolution_source: m.resolution_source.clone(),
                    neg_risk: m.neg_risk,
                    neg_risk_other: m.neg_risk_other,
                    neg_risk_market_id: m.neg_risk_market_id.clone(),
                    neg_risk_request_id: m.neg_risk_request_id.clone(),
                    icon_url: m.icon_url.clone(),
                    is_active: m.is_active,
                    is_closed: m.is_closed,
                    volume_24h: m.volume_24h,
                    volume: m.volume,
                    start_time: m.start_time,
                    end_time: m.end_time,
                    created_at,
                    updated_at: m.updated_at.unwrap_or_else(fallback_ts),
                },
            );
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_outcomes(&self, rows: &[OutcomeRecord]) -> Result<u64, StoreError> {
        self.check_write(BatchKind::Outcomes)?;
        let mut state = self.state.lock().unwrap();
        for o in rows {
            let created_at = o
                .created_at
                .or_else(|| state.outcomes.get(&o.token_id).map(|old| old.created_at))
                .unwrap_or_else(fallback_ts);
            state.outcomes.insert(
                o.token_id.clone(),
                DbOutcome {
                    token_id: o.token_id.clone(),
                    condition_id: o.condition_id.clone(),
                    outcome_text: o.outcome_text.clone(),
                    outcome_index: o.outcome_index,
                    is_winning_outcome: Some(false),
                    created_at,
                    updated_at: o.updated_at.unwrap_or_else(fallback_ts),
                },
            );
        }
        Ok(rows.len() as u64)
    }

    async fn insert_event_tags(&self, rows: &[EventTagRecord]) -> Result<u64, StoreError> {
        self.check_write(BatchKind::Tags)?;
        let mut state = self.state.lock().unwrap();
        let mut inserted = 0;
        for pair in rows {
            if !state.event_tags.contains(pair) {
                state.event_tags.push(*pair);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<DbEvent>, StoreError> {
        self.check_online()?;
        let state = self.state.lock().unwrap();

        let mut matched: Vec<DbEvent> = state
            .events
            .values()
            .filter(|e| e.status == filter.status.as_str())
            .filter(|e| {
                let title = e.title.to_lowercase();
                filter.search_terms.iter().all(|t| title.contains(t.as_str()))
            })
            .filter(|e| match &filter.tag_slug {
                Some(slug) => state.event_tags.iter().any(|t| {
                    t.event_id == e.id && state.tags.get(&t.tag_id) == Some(slug)
                }),
                None => true,
            })
            .filter(|e| match &filter.bookmarked_by {
                Some(user) => state.bookmarks.contains(&(user.clone(), e.id)),
                None => true,
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(matched
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn markets_for_events(&self, event_ids: &[i64]) -> Result<Vec<DbMarket>, StoreError> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .markets
            .values()
            .filter(|m| event_ids.contains(&m.event_id))
            .filter(|m| m.condition_id.as_deref().is_some_and(|c| !c.is_empty()))
            .cloned()
            .collect())
    }

    async fn outcomes_for_conditions(
        &self,
        condition_ids: &[String],
    ) -> Result<Vec<DbOutcome>, StoreError> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        let mut rows: Vec<DbOutcome> = state
            .outcomes
            .values()
            .filter(|o| condition_ids.contains(&o.condition_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.condition_id
                .cmp(&b.condition_id)
                .then(a.outcome_index.unwrap_or(i16::MAX).cmp(&b.outcome_index.unwrap_or(i16::MAX)))
                .then(a.token_id.cmp(&b.token_id))
        });
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_online()
    }
}
