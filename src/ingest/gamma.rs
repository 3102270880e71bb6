//! Gamma API events catalog: wire types and the paginated page source.
//!
//! `/events?limit={n}&offset={k}&active=true&closed=false` returns a JSON array
//! of events, each embedding its markets and tags. Several market fields are
//! JSON arrays encoded as strings (`outcomes`, `clobTokenIds`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::GammaConfig;
use crate::error::{CatalogError, Result};

// ── Gamma API response types ───────────────────────────────────────

/// An event returned from `/events`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaEvent {
    pub id: Option<Value>,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub closed: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub archived: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub show_market_images: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub enable_neg_risk: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub neg_risk_augmented: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub neg_risk: Option<bool>,
    #[serde(rename = "negRiskMarketID")]
    pub neg_risk_market_id: Option<String>,
    pub end_date: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub markets: Option<Vec<GammaMarket>>,
    pub tags: Option<Vec<GammaTag>>,
}

/// A market within a Gamma event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    pub id: Option<Value>,
    pub condition_id: Option<String>,
    pub question: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub resolution_source: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub neg_risk: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub neg_risk_other: Option<bool>,
    #[serde(rename = "negRiskMarketID")]
    pub neg_risk_market_id: Option<String>,
    #[serde(rename = "negRiskRequestID")]
    pub neg_risk_request_id: Option<String>,
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub closed: Option<bool>,
    #[serde(rename = "volume24hr")]
    pub volume_24hr: Option<Value>,
    pub volume: Option<Value>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    /// JSON-encoded array of outcome labels (or a plain array).
    pub outcomes: Option<Value>,
    /// JSON-encoded array of CLOB token ids (or a plain array).
    pub clob_token_ids: Option<Value>,
}

/// A tag attached to a Gamma event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GammaTag {
    pub id: Option<Value>,
    pub slug: Option<String>,
}

/// Gamma flags occasionally arrive as `"true"` or `1`. Anything that does not
/// read as a boolean is treated as absent rather than failing the whole event.
fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    })
}

// ── Page source ────────────────────────────────────────────────────

/// Paginated access to the upstream events catalog.
#[async_trait]
pub trait EventPageSource: Send + Sync {
    /// Fetch one page. The raw payload is returned so the caller can tell an
    /// empty page from a non-array one.
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Value>;
}

/// reqwest-backed Gamma client.
pub struct GammaClient {
    client: Client,
    gamma_url: String,
}

impl GammaClient {
    pub fn new(config: &GammaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(concat!("polymarket-catalog/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            gamma_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EventPageSource for GammaClient {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Value> {
        let url = format!("{}/events", self.gamma_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
                ("active", "true".to_string()),
                ("closed", "false".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CatalogError::Upstream(format!(
                "Gamma API returned {} for offset {}",
                response.status(),
                offset
            )));
        }

        let body = response.bytes().await?;
        debug!(offset, limit, bytes = body.len(), "gamma page received");
        Ok(decode_page(&body))
    }
}

/// Parse a page body. A body that is not JSON comes back as a string value,
/// which ends pagination like any other non-array payload.
pub fn decode_page(body: &[u8]) -> Value {
    match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "gamma page body is not JSON");
            Value::String(String::from_utf8_lossy(body).into_owned())
        }
    }
}
