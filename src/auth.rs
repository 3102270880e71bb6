//! Cron trigger authorization.

use axum::http::{header::AUTHORIZATION, HeaderMap};

/// True when `headers` carry `Authorization: Bearer <secret>`. An unset
/// secret rejects every caller.
pub fn is_cron_authorized(headers: &HeaderMap, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    match value.strip_prefix("Bearer ") {
        Some(token) => constant_time_eq(token.trim().as_bytes(), secret.as_bytes()),
        None => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
