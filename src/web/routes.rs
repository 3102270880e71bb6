//! HTTP route handlers.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::is_cron_authorized;
use crate::catalog::aggregator::EventQuery;
use crate::catalog::view::EventView;
use crate::db::models::EventStatus;
use crate::error::{ApiError, SyncError};
use crate::ingest::pipeline::trigger_sync;

use super::server::AppState;

/// Header set by the session layer in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Build all API routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/events", get(list_events))
        .route("/api/sync/polymarket", get(sync_polymarket))
        .route("/api/prices/last-trade", get(last_trade_prices))
        .route("/health", get(health))
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsParams {
    pub tag: Option<String>,
    pub search: Option<String>,
    pub bookmarked: Option<String>,
    pub status: Option<String>,
    pub offset: Option<String>,
}

impl EventsParams {
    fn into_query(self, user_id: Option<String>) -> Result<EventQuery, ApiError> {
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            None | Some("active") => EventStatus::Active,
            Some("resolved") => EventStatus::Resolved,
            Some(_) => return Err(ApiError::BadRequest("Invalid status filter.".into())),
        };

        Ok(EventQuery {
            tag: self
                .tag
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "trending".to_string()),
            search: self.search.unwrap_or_default(),
            user_id,
            bookmarked: self.bookmarked.as_deref() == Some("true"),
            status,
            offset: parse_offset(self.offset.as_deref()),
        })
    }
}

/// Leading-integer parse: `"12abc"` is 12, non-numeric is 0, negatives clamp to 0.
fn parse_offset(raw: Option<&str>) -> i64 {
    let raw = raw.unwrap_or("").trim();
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    match digits[..end].parse::<i64>() {
        Ok(n) if !negative => n,
        _ => 0,
    }
}

/// GET /api/events: one page of enriched events.
async fn list_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<EventsParams>,
) -> Result<Json<Vec<EventView>>, ApiError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|u| !u.is_empty());
    let query = params.into_query(user_id)?;

    let cancel = state.shutdown.child_token();
    let events = state.aggregator.list_events(&query, &cancel).await?;
    Ok(Json(events))
}

/// GET /api/sync/polymarket: cron-triggered catalog sync.
async fn sync_polymarket(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, SyncError> {
    if !is_cron_authorized(&headers, &state.cron_secret) {
        warn!("rejected unauthenticated sync trigger");
        return Err(SyncError::Unauthenticated);
    }

    let total = trigger_sync(&state.pipeline).await?;
    info!(total_events = total, "sync trigger finished");
    Ok(Json(json!({ "status": "Success", "totalEvents": total })))
}

#[derive(Debug, Deserialize)]
pub struct LastTradeParams {
    pub token_ids: Option<String>,
}

/// GET /api/prices/last-trade?token_ids=a,b: last trade price per token.
async fn last_trade_prices(
    State(state): State<AppState>,
    Query(params): Query<LastTradeParams>,
) -> Json<HashMap<String, f64>> {
    let token_ids: Vec<String> = params
        .token_ids
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    Json(state.oracle.fetch_last_trade_prices(&token_ids).await)
}

/// GET /health: store connectivity check.
async fn health(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            warn!(error = %e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}
