//! Gamma events → store records.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use super::gamma::{GammaEvent, GammaMarket};
use crate::db::models::{EventRecord, EventStatus, EventTagRecord, MarketRecord, OutcomeRecord};

/// Market whose outcome arrays could not be paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedOutcomes {
    pub market_id: String,
    pub token_ids: usize,
    pub labels: usize,
}

/// Records produced from one upstream page, in upsert order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PageBatch {
    pub events: Vec<EventRecord>,
    pub markets: Vec<MarketRecord>,
    pub outcomes: Vec<OutcomeRecord>,
    pub tags: Vec<EventTagRecord>,
    pub skipped_outcomes: Vec<SkippedOutcomes>,
    /// Raw entries that produced no event row.
    pub dropped_events: usize,
}

/// Transform one raw page. Entries that are not event objects or lack an
/// identity are dropped.
pub fn transform_page(raw_events: &[Value]) -> PageBatch {
    let mut batch = PageBatch::default();
    for raw in raw_events {
        let before = batch.events.len();
        match serde_json::from_value::<GammaEvent>(raw.clone()) {
            Ok(event) => transform_event(&event, &mut batch),
            Err(e) => warn!(error = %e, "skipping malformed gamma event"),
        }
        if batch.events.len() == before {
            batch.dropped_events += 1;
        }
    }
    batch
}

pub fn transform_event(event: &GammaEvent, batch: &mut PageBatch) {
    let Some(event_id) = event.id.as_ref().and_then(parse_id) else {
        warn!(slug = ?event.slug, "skipping gamma event without a numeric id");
        return;
    };
    let Some(slug) = event.slug.clone().filter(|s| !s.is_empty()) else {
        warn!(event_id, "skipping gamma event without a slug");
        return;
    };

    let mut total_markets = 0;
    let mut active_markets = 0;

    for market in event.markets.iter().flatten() {
        let Some(record) = market_record(event_id, market) else {
            continue;
        };
        total_markets += 1;
        if record.is_active == Some(true) && record.is_closed != Some(true) {
            active_markets += 1;
        }

        match &record.condition_id {
            Some(condition_id) if !condition_id.is_empty() => {
                let token_ids = parse_string_array(market.clob_token_ids.as_ref());
                let labels = parse_string_array(market.outcomes.as_ref());
                match zip_outcomes(condition_id, &token_ids, &labels, market) {
                    Some(outcomes) => batch.outcomes.extend(outcomes),
                    None => batch.skipped_outcomes.push(SkippedOutcomes {
                        market_id: record.id.to_string(),
                        token_ids: token_ids.len(),
                        labels: labels.len(),
                    }),
                }
            }
            _ => debug!(market_id = record.id, "market has no condition id, no outcomes stored"),
        }

        batch.markets.push(record);
    }

    for tag in event.tags.iter().flatten() {
        match tag.id.as_ref().and_then(parse_id) {
            Some(tag_id) => batch.tags.push(EventTagRecord { event_id, tag_id }),
            None => debug!(event_id, slug = ?tag.slug, "tag without numeric id"),
        }
    }

    batch.events.push(EventRecord {
        id: event_id,
        slug,
        title: event.title.clone().unwrap_or_default(),
        icon_url: event.icon.clone(),
        rules: event.description.clone(),
        status: EventStatus::from_flags(event.active, event.closed, event.archived),
        show_market_icons: event.show_market_images,
        enable_neg_risk: event.enable_neg_risk,
        neg_risk_augmented: event.neg_risk_augmented,
        neg_risk: event.neg_risk,
        neg_risk_market_id: event.neg_risk_market_id.clone(),
        active_markets_count: Some(active_markets),
        total_markets_count: Some(total_markets),
        end_date: parse_timestamp(event.end_date.as_deref()),
        created_at: parse_timestamp(event.created_at.as_deref()),
        updated_at: parse_timestamp(event.updated_at.as_deref()),
    });
}

fn market_record(event_id: i64, market: &GammaMarket) -> Option<MarketRecord> {
    let Some(id) = market.id.as_ref().and_then(parse_id) else {
        warn!(event_id, slug = ?market.slug, "skipping gamma market without a numeric id");
        return None;
    };

    Some(MarketRecord {
        id,
        event_id,
        condition_id: market.condition_id.clone(),
        title: market.question.clone(),
        slug: market.slug.clone().unwrap_or_default(),
        question: market.question.clone(),
        rules: market.description.clone(),
        resolution_source: market.resolution_source.clone(),
        neg_risk: market.neg_risk,
        neg_risk_other: market.neg_risk_other,
        neg_risk_market_id: market.neg_risk_market_id.clone(),
        neg_risk_request_id: market.neg_risk_request_id.clone(),
        icon_url: market.icon.clone(),
        is_active: market.active,
        is_closed: market.closed,
        volume_24h: market.volume_24hr.as_ref().and_then(parse_volume),
        volume: market.volume.as_ref().and_then(parse_volume),
        start_time: parse_timestamp(market.start_date.as_deref()),
        end_time: parse_timestamp(market.end_date.as_deref()),
        created_at: parse_timestamp(market.created_at.as_deref()),
        updated_at: parse_timestamp(market.updated_at.as_deref()),
    })
}

/// Pair token ids with labels by position. Returns `None` unless both arrays
/// are non-empty and equally long.
pub fn zip_outcomes(
    condition_id: &str,
    token_ids: &[String],
    labels: &[String],
    market: &GammaMarket,
) -> Option<Vec<OutcomeRecord>> {
    if token_ids.is_empty() || token_ids.len() != labels.len() {
        return None;
    }

    let created_at = parse_timestamp(market.created_at.as_deref());
    let updated_at = parse_timestamp(market.updated_at.as_deref());

    Some(
        token_ids
            .iter()
            .zip(labels)
            .enumerate()
            .map(|(i, (token_id, label))| OutcomeRecord {
                token_id: token_id.clone(),
                condition_id: condition_id.to_string(),
                outcome_text: label.clone(),
                outcome_index: i16::try_from(i).ok(),
                created_at,
                updated_at,
            })
            .collect(),
    )
}

/// Parse a value that is either a JSON-encoded string array or a real array.
/// Non-string elements are dropped; anything unparseable yields an empty list.
pub fn parse_string_array(val: Option<&Value>) -> Vec<String> {
    let strings = |items: &[Value]| -> Vec<String> {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    };

    match val {
        Some(Value::Array(items)) => strings(items),
        Some(Value::String(s)) => match serde_json::from_str::<Vec<Value>>(s) {
            Ok(items) => strings(&items),
            Err(e) => {
                warn!(error = %e, raw = %s, "failed to parse embedded JSON array, using empty list");
                Vec::new()
            }
        },
        _ => Vec::new(),
    }
}

/// Numeric identity from a string or number.
pub fn parse_id(val: &Value) -> Option<i64> {
    match val {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-negative volume from a number or numeric string, rounded to 6 places.
pub fn parse_volume(val: &Value) -> Option<Decimal> {
    let parsed = match val {
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
        Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .ok()
        }
        _ => None,
    }?;
    (!parsed.is_sign_negative()).then(|| parsed.round_dp(6))
}

/// RFC 3339 timestamp, or a bare date taken as midnight UTC.
pub fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = raw.parse::<DateTime<Utc>>() {
        return Some(dt);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
