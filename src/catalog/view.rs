//! Event view models served by the read API.
//!
//! Pure: given stored rows and a price map, produces the client-facing shape
//! with derived mid-price, probability, volume totals and the trending flag.

use std::collections::HashMap;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::clob::prices::OutcomePrices;
use crate::db::models::{DbEvent, DbMarket, DbOutcome};

/// Outcome index treated as YES in binary markets.
pub const YES_OUTCOME_INDEX: i16 = 0;

/// Tag shown for events without a resolved category.
pub const DEFAULT_MAIN_TAG: &str = "World";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeView {
    pub token_id: String,
    pub condition_id: String,
    pub outcome_text: String,
    pub outcome_index: i16,
    pub is_winning_outcome: bool,
    pub buy_price: f64,
    pub sell_price: f64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketView {
    pub id: String,
    pub event_id: String,
    pub condition_id: String,
    pub question_id: String,
    pub title: String,
    pub slug: String,
    pub question: Option<String>,
    pub rules: Option<String>,
    pub resolution_source: Option<String>,
    pub icon_url: Option<String>,
    pub neg_risk: bool,
    pub neg_risk_other: bool,
    pub neg_risk_market_id: Option<String>,
    pub neg_risk_request_id: Option<String>,
    pub is_active: bool,
    pub is_resolved: bool,
    pub probability: f64,
    pub price: f64,
    pub volume: f64,
    pub volume_24h: f64,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub outcomes: Vec<OutcomeView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventView {
    /// Decimal text so large ids survive JSON number precision.
    pub id: String,
    pub slug: String,
    pub title: String,
    pub creator: String,
    pub icon_url: Option<String>,
    pub show_market_icons: bool,
    pub enable_neg_risk: bool,
    pub neg_risk_augmented: bool,
    pub neg_risk: bool,
    pub neg_risk_market_id: Option<String>,
    pub status: String,
    pub rules: Option<String>,
    pub active_markets_count: i32,
    pub total_markets_count: i32,
    pub created_at: String,
    pub updated_at: String,
    pub end_date: Option<String>,
    pub resolved_at: Option<String>,
    pub volume: f64,
    pub markets: Vec<MarketView>,
    pub tags: Vec<String>,
    pub main_tag: String,
    pub is_bookmarked: bool,
    pub is_trending: bool,
}

/// A market row with its outcomes attached.
#[derive(Debug, Clone)]
pub struct MarketWithOutcomes {
    pub market: DbMarket,
    pub outcomes: Vec<DbOutcome>,
}

/// Per-request inputs shared by every event in a page.
#[derive(Debug, Clone)]
pub struct ViewContext {
    pub now: DateTime<Utc>,
    pub trending_window: Duration,
    pub image_base_url: Option<String>,
}

impl ViewContext {
    pub fn new(now: DateTime<Utc>, trending_window_hours: i64, image_base_url: Option<String>) -> Self {
        Self {
            now,
            trending_window: Duration::hours(trending_window_hours),
            image_base_url,
        }
    }
}

pub fn assemble_event(
    event: &DbEvent,
    markets: &[MarketWithOutcomes],
    prices: &HashMap<String, OutcomePrices>,
    ctx: &ViewContext,
) -> EventView {
    let markets: Vec<MarketView> = markets
        .iter()
        .map(|m| assemble_market(&m.market, &m.outcomes, prices, ctx))
        .collect();

    let recent_volume: f64 = markets.iter().map(|m| m.volume_24h).sum();
    let total_volume: f64 = markets.iter().map(|m| m.volume).sum();
    let recently_updated = ctx.now - event.updated_at < ctx.trending_window;

    EventView {
        id: event.id.to_string(),
        slug: event.slug.clone(),
        title: event.title.clone(),
        creator: String::new(),
        icon_url: resolve_image_url(event.icon_url.as_deref(), ctx.image_base_url.as_deref()),
        show_market_icons: event.show_market_icons.unwrap_or(true),
        enable_neg_risk: event.enable_neg_risk.unwrap_or(false),
        neg_risk_augmented: event.neg_risk_augmented.unwrap_or(false),
        neg_risk: event.neg_risk.unwrap_or(false),
        neg_risk_market_id: event.neg_risk_market_id.clone().filter(|s| !s.is_empty()),
        status: event.status.clone(),
        rules: event.rules.clone().filter(|s| !s.is_empty()),
        active_markets_count: event.active_markets_count.unwrap_or(0),
        total_markets_count: event.total_markets_count.unwrap_or(0),
        created_at: timestamp(event.created_at),
        updated_at: timestamp(event.updated_at),
        end_date: event.end_date.map(timestamp),
        resolved_at: None,
        volume: total_volume,
        markets,
        tags: Vec::new(),
        main_tag: DEFAULT_MAIN_TAG.to_string(),
        is_bookmarked: false,
        is_trending: recent_volume > 0.0 || recently_updated,
    }
}

pub fn assemble_market(
    market: &DbMarket,
    outcomes: &[DbOutcome],
    prices: &HashMap<String, OutcomePrices>,
    ctx: &ViewContext,
) -> MarketView {
    let outcomes: Vec<OutcomeView> = outcomes
        .iter()
        .map(|o| {
            let quote = prices.get(&o.token_id).copied().unwrap_or(OutcomePrices::FALLBACK);
            OutcomeView {
                token_id: o.token_id.clone(),
                condition_id: o.condition_id.clone(),
                outcome_text: o.outcome_text.clone(),
                outcome_index: o.outcome_index.unwrap_or(0),
                is_winning_outcome: o.is_winning_outcome.unwrap_or(false),
                buy_price: quote.buy,
                sell_price: quote.sell,
                created_at: timestamp(o.created_at),
                updated_at: timestamp(o.updated_at),
            }
        })
        .collect();

    let primary = outcomes
        .iter()
        .find(|o| o.outcome_index == YES_OUTCOME_INDEX)
        .or_else(|| outcomes.first());
    let (buy, sell) = primary
        .map(|o| (o.buy_price, o.sell_price))
        .unwrap_or((OutcomePrices::FALLBACK.buy, OutcomePrices::FALLBACK.sell));
    let mid = (buy + sell) / 2.0;

    let condition_id = market.condition_id.clone().unwrap_or_default();

    MarketView {
        id: market.id.to_string(),
        event_id: market.event_id.to_string(),
        question_id: condition_id.clone(),
        condition_id,
        title: market
            .short_title
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| market.title.clone())
            .unwrap_or_default(),
        slug: market.slug.clone(),
        question: market.question.clone(),
        rules: market.rules.clone(),
        resolution_source: market.resolution_source.clone(),
        icon_url: resolve_image_url(market.icon_url.as_deref(), ctx.image_base_url.as_deref()),
        neg_risk: market.neg_risk.unwrap_or(false),
        neg_risk_other: market.neg_risk_other.unwrap_or(false),
        neg_risk_market_id: market.neg_risk_market_id.clone(),
        neg_risk_request_id: market.neg_risk_request_id.clone(),
        is_active: market.is_active.unwrap_or(false),
        is_resolved: market.is_closed.unwrap_or(false),
        probability: mid * 100.0,
        price: mid,
        volume: decimal_or_zero(market.volume),
        volume_24h: decimal_or_zero(market.volume_24h),
        start_time: market.start_time.map(timestamp),
        end_time: market.end_time.map(timestamp),
        created_at: timestamp(market.created_at),
        updated_at: timestamp(market.updated_at),
        outcomes,
    }
}

/// Absolute URLs pass through; storage paths are joined onto `base` when set.
pub fn resolve_image_url(path: Option<&str>, base: Option<&str>) -> Option<String> {
    let path = path.map(str::trim).filter(|p| !p.is_empty())?;
    if path.starts_with("http://") || path.starts_with("https://") {
        return Some(path.to_string());
    }
    match base {
        Some(base) => Some(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )),
        None => Some(path.to_string()),
    }
}

fn decimal_or_zero(value: Option<Decimal>) -> f64 {
    value.and_then(|v| v.to_f64()).unwrap_or(0.0)
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
