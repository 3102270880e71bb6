//! Database row types for the Polymarket mirror tables.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a mirrored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Active,
    Resolved,
    Archived,
}

impl EventStatus {
    /// Derive status from the upstream flags. Priority: archived > closed > active > draft.
    pub fn from_flags(active: Option<bool>, closed: Option<bool>, archived: Option<bool>) -> Self {
        if archived.unwrap_or(false) {
            EventStatus::Archived
        } else if closed.unwrap_or(false) {
            EventStatus::Resolved
        } else if active.unwrap_or(false) {
            EventStatus::Active
        } else {
            EventStatus::Draft
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Active => "active",
            EventStatus::Resolved => "resolved",
            EventStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(EventStatus::Draft),
            "active" => Ok(EventStatus::Active),
            "resolved" => Ok(EventStatus::Resolved),
            "archived" => Ok(EventStatus::Archived),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

// ── Write records (ingestion) ────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub icon_url: Option<String>,
    pub rules: Option<String>,
    pub status: EventStatus,
    pub show_market_icons: Option<bool>,
    pub enable_neg_risk: Option<bool>,
    pub neg_risk_augmented: Option<bool>,
    pub neg_risk: Option<bool>,
    pub neg_risk_market_id: Option<String>,
    pub active_markets_count: Option<i32>,
    pub total_markets_count: Option<i32>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketRecord {
    pub id: i64,
    pub event_id: i64,
    pub condition_id: Option<String>,
    pub title: Option<String>,
    pub slug: String,
    pub question: Option<String>,
    pub rules: Option<String>,
    pub resolution_source: Option<String>,
    pub neg_risk: Option<bool>,
    pub neg_risk_other: Option<bool>,
    pub neg_risk_market_id: Option<String>,
    pub neg_risk_request_id: Option<String>,
    pub icon_url: Option<String>,
    pub is_active: Option<bool>,
    pub is_closed: Option<bool>,
    pub volume_24h: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRecord {
    pub token_id: String,
    pub condition_id: String,
    pub outcome_text: String,
    pub outcome_index: Option<i16>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventTagRecord {
    pub event_id: i64,
    pub tag_id: i64,
}

// ── Read rows ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct DbEvent {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub icon_url: Option<String>,
    pub rules: Option<String>,
    pub status: String,
    pub show_market_icons: Option<bool>,
    pub enable_neg_risk: Option<bool>,
    pub neg_risk_augmented: Option<bool>,
    pub neg_risk: Option<bool>,
    pub neg_risk_market_id: Option<String>,
    pub active_markets_count: Option<i32>,
    pub total_markets_count: Option<i32>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct DbMarket {
    pub id: i64,
    pub event_id: i64,
    pub condition_id: Option<String>,
    pub title: Option<String>,
    pub slug: String,
    pub short_title: Option<String>,
    pub question: Option<String>,
    pub rules: Option<String>,
    pub resolution_source: Option<String>,
    pub neg_risk: Option<bool>,
    pub neg_risk_other: Option<bool>,
    pub neg_risk_market_id: Option<String>,
    pub neg_risk_request_id: Option<String>,
    pub icon_url: Option<String>,
    pub is_active: Option<bool>,
    pub is_closed: Option<bool>,
    pub volume_24h: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct DbOutcome {
    pub token_id: String,
    pub condition_id: String,
    pub outcome_text: String,
    pub outcome_index: Option<i16>,
    pub is_winning_outcome: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Read filter ──────────────────────────────────────────────────

/// Predicate for the event listing query. All clauses are ANDed.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFilter {
    pub status: EventStatus,
    /// Lowercase terms; each must appear in the title.
    pub search_terms: Vec<String>,
    /// Tag slug the event must be associated with.
    pub tag_slug: Option<String>,
    /// User whose bookmarks the event must appear in.
    pub bookmarked_by: Option<String>,
    pub limit: i64,
    pub offset: i64,
}
