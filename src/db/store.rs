//! Storage seam shared by the ingestion pipeline and the read aggregator.

use async_trait::async_trait;
use sqlx::PgPool;

use super::models::*;
use super::{pool, queries};
use crate::error::StoreError;

/// Row store for the mirrored catalog. Upserts are idempotent per identity key.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn upsert_events(&self, rows: &[EventRecord]) -> Result<u64, StoreError>;
    async fn upsert_markets(&self, rows: &[MarketRecord]) -> Result<u64, StoreError>;
    async fn upsert_outcomes(&self, rows: &[OutcomeRecord]) -> Result<u64, StoreError>;
    async fn insert_event_tags(&self, rows: &[EventTagRecord]) -> Result<u64, StoreError>;

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<DbEvent>, StoreError>;
    async fn markets_for_events(&self, event_ids: &[i64]) -> Result<Vec<DbMarket>, StoreError>;
    async fn outcomes_for_conditions(
        &self,
        condition_ids: &[String],
    ) -> Result<Vec<DbOutcome>, StoreError>;

    /// Cheap liveness check.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// PostgreSQL-backed store. The pool is created once at startup and injected.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn upsert_events(&self, rows: &[EventRecord]) -> Result<u64, StoreError> {
        Ok(queries::upsert_events(&self.pool, rows).await?)
    }

    async fn upsert_markets(&self, rows: &[MarketRecord]) -> Result<u64, StoreError> {
        Ok(queries::upsert_markets(&self.pool, rows).await?)
    }

    async fn upsert_outcomes(&self, rows: &[OutcomeRecord]) -> Result<u64, StoreError> {
        Ok(queries::upsert_outcomes(&self.pool, rows).await?)
    }

    async fn insert_event_tags(&self, rows: &[EventTagRecord]) -> Result<u64, StoreError> {
        Ok(queries::insert_event_tags(&self.pool, rows).await?)
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<DbEvent>, StoreError> {
        Ok(queries::list_events(&self.pool, filter).await?)
    }

    async fn markets_for_events(&self, event_ids: &[i64]) -> Result<Vec<DbMarket>, StoreError> {
        Ok(queries::get_markets_for_events(&self.pool, event_ids).await?)
    }

    async fn outcomes_for_conditions(
        &self,
        condition_ids: &[String],
    ) -> Result<Vec<DbOutcome>, StoreError> {
        Ok(queries::get_outcomes_for_conditions(&self.pool, condition_ids).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(pool::health_check(&self.pool).await?)
    }
}
