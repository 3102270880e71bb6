//! SQL query functions for the Polymarket mirror tables.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::models::*;

/// Postgres caps a statement at 65535 bind parameters.
const PG_MAX_BINDS: usize = 65_535;

const EVENT_COLUMNS: usize = 16;
const MARKET_COLUMNS: usize = 21;
const OUTCOME_COLUMNS: usize = 6;
const EVENT_TAG_COLUMNS: usize = 2;

const TAG_PAIR_ABSENT: &str = ") AS v(event_id, tag_id) WHERE NOT EXISTS (\
     SELECT 1 FROM polymarket_event_tags pet \
     WHERE pet.event_id = v.event_id AND pet.tag_id = v.tag_id)";

const EVENT_SELECT: &str = "SELECT e.id, e.slug, e.title, e.icon_url, e.rules, e.status, \
     e.show_market_icons, e.enable_neg_risk, e.neg_risk_augmented, e.neg_risk, \
     e.neg_risk_market_id, e.active_markets_count, e.total_markets_count, \
     e.end_date, e.created_at, e.updated_at \
     FROM polymarket_events e";

/// Collapse rows sharing a conflict key; the last occurrence wins but keeps the
/// first occurrence's position. A single `ON CONFLICT DO UPDATE` statement may
/// not touch the same row twice.
pub fn last_wins<T, K, F>(rows: &[T], key: F) -> Vec<&T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::with_capacity(rows.len());
    let mut out: Vec<&T> = Vec::with_capacity(rows.len());
    for row in rows {
        match index.entry(key(row)) {
            Entry::Occupied(slot) => out[*slot.get()] = row,
            Entry::Vacant(slot) => {
                slot.insert(out.len());
                out.push(row);
            }
        }
    }
    out
}

fn rows_per_statement(columns: usize) -> usize {
    (PG_MAX_BINDS / columns).max(1)
}

fn push_ts_or_now(b: &mut Separated<'_, '_, Postgres, &'static str>, ts: Option<DateTime<Utc>>) {
    b.push("COALESCE(");
    b.push_bind_unseparated(ts);
    b.push_unseparated(", now())");
}

/// Update-arm assignment for `created_at`. A row whose incoming value fell
/// back to `now()` keeps the stored creation time; `now()` is fixed for the
/// whole statement, so it matches the value produced by [`push_ts_or_now`].
fn keep_created_at(table: &str) -> String {
    format!(
        "created_at = CASE WHEN EXCLUDED.created_at = now() \
         THEN {table}.created_at ELSE EXCLUDED.created_at END"
    )
}

/// Escape `%`, `_` and `\` for use inside a LIKE pattern.
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ── Upserts ──────────────────────────────────────────────────────

pub async fn upsert_events(pool: &PgPool, rows: &[EventRecord]) -> sqlx::Result<u64> {
    let rows = last_wins(rows, |r| r.id);
    let mut affected = 0;

    for chunk in rows.chunks(rows_per_statement(EVENT_COLUMNS)) {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO polymarket_events (id, slug, title, icon_url, rules, status, \
             show_market_icons, enable_neg_risk, neg_risk_augmented, neg_risk, \
             neg_risk_market_id, active_markets_count, total_markets_count, \
             end_date, created_at, updated_at) ",
        );
        qb.push_values(chunk.iter(), |mut b, e| {
            b.push_bind(e.id)
                .push_bind(e.slug.clone())
                .push_bind(e.title.clone())
                .push_bind(e.icon_url.clone())
                .push_bind(e.rules.clone())
                .push_bind(e.status.as_str())
                .push_bind(e.show_market_icons)
                .push_bind(e.enable_neg_risk)
                .push_bind(e.neg_risk_augmented)
                .push_bind(e.neg_risk)
                .push_bind(e.neg_risk_market_id.clone())
                .push_bind(e.active_markets_count)
                .push_bind(e.total_markets_count)
                .push_bind(e.end_date);
            push_ts_or_now(&mut b, e.created_at);
            push_ts_or_now(&mut b, e.updated_at);
        });
        qb.push(
            " ON CONFLICT (id) DO UPDATE SET \
             slug = EXCLUDED.slug, title = EXCLUDED.title, icon_url = EXCLUDED.icon_url, \
             rules = EXCLUDED.rules, status = EXCLUDED.status, \
             show_market_icons = EXCLUDED.show_market_icons, \
             enable_neg_risk = EXCLUDED.enable_neg_risk, \
             neg_risk_augmented = EXCLUDED.neg_risk_augmented, \
             neg_risk = EXCLUDED.neg_risk, neg_risk_market_id = EXCLUDED.neg_risk_market_id, \
             active_markets_count = EXCLUDED.active_markets_count, \
             total_markets_count = EXCLUDED.total_markets_count, \
             end_date = EXCLUDED.end_date, updated_at = EXCLUDED.updated_at, ",
        );
        qb.push(keep_created_at("polymarket_events"));
        affected += qb.build().execute(pool).await?.rows_affected();
    }

    Ok(affected)
}

pub async fn upsert_markets(pool: &PgPool, rows: &[MarketRecord]) -> sqlx::Result<u64> {
    let rows = last_wins(rows, |r| r.id);
    let mut affected = 0;

    for chunk in rows.chunks(rows_per_statement(MARKET_COLUMNS)) {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO polymarket_markets (id, event_id, condition_id, title, slug, \
             question, rules, resolution_source, neg_risk, neg_risk_other, \
             neg_risk_market_id, neg_risk_request_id, icon_url, is_active, is_closed, \
             volume_24h, volume, start_time, end_time, created_at, updated_at) ",
        );
        qb.push_values(chunk.iter(), |mut b, m| {
            b.push_bind(m.id)
                .push_bind(m.event_id)
                .push_bind(m.condition_id.clone())
                .push_bind(m.title.clone())
                .push_bind(m.slug.clone())
                .push_bind(m.question.clone())
                .push_bind(m.rules.clone())
                .push_bind(m.resolution_source.clone())
                .push_bind(m.neg_risk)
                .push_bind(m.neg_risk_other)
                .push_bind(m.neg_risk_market_id.clone())
                .push_bind(m.neg_risk_request_id.clone())
                .push_bind(m.icon_url.clone())
                .push_bind(m.is_active)
                .push_bind(m.is_closed)
                .push_bind(m.volume_24h)
                .push_bind(m.volume)
                .push_bind(m.start_time)
                .push_bind(m.end_time);
            push_ts_or_now(&mut b, m.created_at);
            push_ts_or_now(&mut b, m.updated_at);
        });
        qb.push(
            " ON CONFLICT (id) DO UPDATE SET \
             event_id = EXCLUDED.event_id, condition_id = EXCLUDED.condition_id, \
             title = EXCLUDED.title, slug = EXCLUDED.slug, question = EXCLUDED.question, \
             rules = EXCLUDED.rules, resolution_source = EXCLUDED.resolution_source, \
             neg_risk = EXCLUDED.neg_risk, neg_risk_other = EXCLUDED.neg_risk_other, \
             neg_risk_market_id = EXCLUDED.neg_risk_market_id, \
             neg_risk_request_id = EXCLUDED.neg_risk_request_id, \
             icon_url = EXCLUDED.icon_url, is_active = EXCLUDED.is_active, \
             is_closed = EXCLUDED.is_closed, volume_24h = EXCLUDED.volume_24h, \
             volume = EXCLUDED.volume, start_time = EXCLUDED.start_time, \
             end_time = EXCLUDED.end_time, updated_at = EXCLUDED.updated_at, ",
        );
        qb.push(keep_created_at("polymarket_markets"));
        affected += qb.build().execute(pool).await?.rows_affected();
    }

    Ok(affected)
}

pub async fn upsert_outcomes(pool: &PgPool, rows: &[OutcomeRecord]) -> sqlx::Result<u64> {
    let rows = last_wins(rows, |r| r.token_id.clone());
    let mut affected = 0;

    for chunk in rows.chunks(rows_per_statement(OUTCOME_COLUMNS)) {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO polymarket_outcomes (token_id, condition_id, outcome_text, \
             outcome_index, created_at, updated_at) ",
        );
        qb.push_values(chunk.iter(), |mut b, o| {
            b.push_bind(o.token_id.clone())
                .push_bind(o.condition_id.clone())
                .push_bind(o.outcome_text.clone())
                .push_bind(o.outcome_index);
            push_ts_or_now(&mut b, o.created_at);
            push_ts_or_now(&mut b, o.updated_at);
        });
        qb.push(
            " ON CONFLICT (token_id) DO UPDATE SET \
             condition_id = EXCLUDED.condition_id, outcome_text = EXCLUDED.outcome_text, \
             outcome_index = EXCLUDED.outcome_index, updated_at = EXCLUDED.updated_at, ",
        );
        qb.push(keep_created_at("polymarket_outcomes"));
        affected += qb.build().execute(pool).await?.rows_affected();
    }

    Ok(affected)
}

/// Tag pairs have no conflict target, so a pair is only written when the
/// table does not already hold it. Re-running a sync adds no rows.
pub async fn insert_event_tags(pool: &PgPool, rows: &[EventTagRecord]) -> sqlx::Result<u64> {
    let rows = last_wins(rows, |r| *r);
    let mut affected = 0;

    for chunk in rows.chunks(rows_per_statement(EVENT_TAG_COLUMNS)) {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO polymarket_event_tags (event_id, tag_id) \
             SELECT v.event_id, v.tag_id FROM (",
        );
        qb.push_values(chunk.iter(), |mut b, t| {
            b.push_bind(t.event_id).push_bind(t.tag_id);
        });
        qb.push(TAG_PAIR_ABSENT);
        affected += qb.build().execute(pool).await?.rows_affected();
    }

    Ok(affected)
}

// ── Reads ────────────────────────────────────────────────────────

pub async fn list_events(pool: &PgPool, filter: &EventFilter) -> sqlx::Result<Vec<DbEvent>> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(EVENT_SELECT);

    qb.push(" WHERE e.status = ");
    qb.push_bind(filter.status.as_str());

    for term in &filter.search_terms {
        qb.push(" AND LOWER(e.title) LIKE ");
        qb.push_bind(format!("%{}%", escape_like(term)));
        qb.push(" ESCAPE '\\'");
    }

    if let Some(tag) = &filter.tag_slug {
        qb.push(
            " AND EXISTS (SELECT 1 FROM polymarket_event_tags pet \
             INNER JOIN tags t ON pet.tag_id = t.id \
             WHERE pet.event_id = e.id AND t.slug = ",
        );
        qb.push_bind(tag.clone());
        qb.push(")");
    }

    if let Some(user_id) = &filter.bookmarked_by {
        qb.push(" AND EXISTS (SELECT 1 FROM bookmarks b WHERE b.event_id = e.id AND b.user_id = ");
        qb.push_bind(user_id.clone());
        qb.push(")");
    }

    qb.push(" ORDER BY e.created_at DESC, e.id DESC LIMIT ");
    qb.push_bind(filter.limit);
    qb.push(" OFFSET ");
    qb.push_bind(filter.offset);

    qb.build_query_as::<DbEvent>().fetch_all(pool).await
}

/// Markets of the given events that carry a non-empty condition id.
pub async fn get_markets_for_events(pool: &PgPool, event_ids: &[i64]) -> sqlx::Result<Vec<DbMarket>> {
    sqlx::query_as::<_, DbMarket>(
        "SELECT id, event_id, condition_id, title, slug, short_title, question, rules, \
         resolution_source, neg_risk, neg_risk_other, neg_risk_market_id, neg_risk_request_id, \
         icon_url, is_active, is_closed, volume_24h, volume, start_time, end_time, \
         created_at, updated_at \
         FROM polymarket_markets \
         WHERE event_id = ANY($1) AND condition_id IS NOT NULL AND condition_id <> '' \
         ORDER BY id",
    )
    .bind(event_ids)
    .fetch_all(pool)
    .await
}

pub async fn get_outcomes_for_conditions(
    pool: &PgPool,
    condition_ids: &[String],
) -> sqlx::Result<Vec<DbOutcome>> {
    sqlx::query_as::<_, DbOutcome>(
        "SELECT token_id, condition_id, outcome_text, outcome_index, is_winning_outcome, \
         created_at, updated_at \
         FROM polymarket_outcomes \
         WHERE condition_id = ANY($1) \
         ORDER BY condition_id, outcome_index NULLS LAST, token_id",
    )
    .bind(condition_ids)
    .fetch_all(pool)
    .await
}
