//! Read path: stored events joined with markets, outcomes and live prices.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::view::{assemble_event, EventView, MarketWithOutcomes, ViewContext};
use crate::clob::prices::PriceOracle;
use crate::config::CatalogConfig;
use crate::db::models::{DbMarket, DbOutcome, EventFilter, EventStatus};
use crate::db::store::CatalogStore;
use crate::error::{CatalogError, Result};

/// Tag values that select the unfiltered feed rather than a tag slug.
const FEED_TAGS: [&str; 2] = ["trending", "new"];

/// Listing parameters as received from the HTTP layer.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub tag: String,
    pub search: String,
    pub user_id: Option<String>,
    pub bookmarked: bool,
    pub status: EventStatus,
    pub offset: i64,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            tag: "trending".to_string(),
            search: String::new(),
            user_id: None,
            bookmarked: false,
            status: EventStatus::Active,
            offset: 0,
        }
    }
}

impl EventQuery {
    pub fn to_filter(&self, page_size: i64) -> EventFilter {
        let search_terms = self
            .search
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let tag = self.tag.trim();
        let tag_slug = (!tag.is_empty() && !FEED_TAGS.contains(&tag)).then(|| tag.to_string());

        let bookmarked_by = if self.bookmarked {
            self.user_id.clone().filter(|u| !u.is_empty())
        } else {
            None
        };

        EventFilter {
            status: self.status,
            search_terms,
            tag_slug,
            bookmarked_by,
            limit: page_size,
            offset: self.offset.max(0),
        }
    }
}

pub struct EventAggregator {
    store: Arc<dyn CatalogStore>,
    oracle: Arc<PriceOracle>,
    page_size: i64,
    trending_window_hours: i64,
    image_base_url: Option<String>,
}

impl EventAggregator {
    pub fn new(store: Arc<dyn CatalogStore>, oracle: Arc<PriceOracle>, config: &CatalogConfig) -> Self {
        Self {
            store,
            oracle,
            page_size: config.page_size,
            trending_window_hours: config.trending_window_hours,
            image_base_url: config.image_base_url.clone(),
        }
    }

    /// List one page of enriched events. Errors are returned, never panicked
    /// or logged-and-dropped; cancelling `cancel` only cuts price fetching short.
    pub async fn list_events(
        &self,
        query: &EventQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<EventView>> {
        let result = self.load(query, cancel).await;
        if let Err(e) = &result {
            error!(error = %e, status = %query.status, offset = query.offset, "failed to list events");
        }
        result
    }

    async fn load(&self, query: &EventQuery, cancel: &CancellationToken) -> Result<Vec<EventView>> {
        let filter = query.to_filter(self.page_size);

        let events = self
            .store
            .list_events(&filter)
            .await
            .map_err(CatalogError::Store)?;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let event_ids: Vec<i64> = events.iter().map(|e| e.id).collect();
        let markets = self
            .store
            .markets_for_events(&event_ids)
            .await
            .map_err(CatalogError::Store)?;

        let condition_ids: Vec<String> = markets
            .iter()
            .filter_map(|m| m.condition_id.clone())
            .filter(|c| !c.is_empty())
            .collect();
        let outcomes = if condition_ids.is_empty() {
            Vec::new()
        } else {
            self.store
                .outcomes_for_conditions(&condition_ids)
                .await
                .map_err(CatalogError::Store)?
        };

        let mut grouped = group_markets(markets, outcomes);

        let token_ids: Vec<String> = grouped
            .values()
            .flatten()
            .flat_map(|m| m.outcomes.iter().map(|o| o.token_id.clone()))
            .collect();
        let prices = self.oracle.fetch_outcome_prices(&token_ids, cancel).await;

        let ctx = ViewContext::new(Utc::now(), self.trending_window_hours, self.image_base_url.clone());

        let views: Vec<EventView> = events
            .iter()
            .filter_map(|event| {
                let markets = grouped.remove(&event.id).filter(|m| !m.is_empty())?;
                Some(assemble_event(event, &markets, &prices, &ctx))
            })
            .collect();

        debug!(
            requested = event_ids.len(),
            returned = views.len(),
            tokens = token_ids.len(),
            "events assembled"
        );
        Ok(views)
    }
}

/// Attach outcomes to markets through a condition id index, then group the
/// markets by owning event. Markets without a condition id are dropped.
fn group_markets(
    markets: Vec<DbMarket>,
    outcomes: Vec<DbOutcome>,
) -> HashMap<i64, Vec<MarketWithOutcomes>> {
    let mut by_condition: HashMap<String, Vec<DbOutcome>> = HashMap::new();
    for outcome in outcomes {
        by_condition
            .entry(outcome.condition_id.clone())
            .or_default()
            .push(outcome);
    }

    let mut by_event: HashMap<i64, Vec<MarketWithOutcomes>> = HashMap::new();
    for market in markets {
        let Some(condition_id) = market.condition_id.as_deref().filter(|c| !c.is_empty()) else {
            continue;
        };
        let outcomes = by_condition.get(condition_id).cloned().unwrap_or_default();
        by_event
            .entry(market.event_id)
            .or_default()
            .push(MarketWithOutcomes { market, outcomes });
    }
    by_event
}
