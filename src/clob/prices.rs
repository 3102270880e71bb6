//! CLOB price lookups: bulk bid/ask quotes and last trade prices.
//!
//! Quotes are requested in batches of at most `max_price_batch` tokens. A failed
//! batch is retried one token per request, concurrently. Tokens that still have
//! no price get the 0.5/0.5 fallback. A cancelled fetch stops issuing requests
//! and leaves the remaining tokens on the fallback.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::ClobConfig;
use crate::events::bus::{EventBus, SyncEvent};

/// Price assigned to tokens that could not be priced.
pub const FALLBACK_PRICE: f64 = 0.5;

/// Buy/sell quote for one outcome token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutcomePrices {
    pub buy: f64,
    pub sell: f64,
}

impl OutcomePrices {
    pub const FALLBACK: OutcomePrices = OutcomePrices {
        buy: FALLBACK_PRICE,
        sell: FALLBACK_PRICE,
    };
}

/// `/prices` response: token id → sides quoted for that token.
pub type QuoteResponse = HashMap<String, Option<QuoteSides>>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteSides {
    #[serde(rename = "BUY")]
    pub buy: Option<Value>,
    #[serde(rename = "SELL")]
    pub sell: Option<Value>,
}

/// One entry of the `/last-trades-prices` response.
#[derive(Debug, Clone, Deserialize)]
pub struct LastTradeEntry {
    pub token_id: Option<String>,
    pub price: Option<Value>,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    token_id: &'a str,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("CLOB returned status {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("request cancelled")]
    Cancelled,
}

/// Wire access to the CLOB pricing endpoints.
#[async_trait]
pub trait QuoteTransport: Send + Sync {
    async fn post_prices(&self, token_ids: &[String]) -> Result<QuoteResponse, TransportError>;
    async fn post_last_trades(
        &self,
        token_ids: &[String],
    ) -> Result<Vec<LastTradeEntry>, TransportError>;
}

/// reqwest-backed transport.
pub struct HttpQuoteTransport {
    client: Client,
    base_url: String,
}

impl HttpQuoteTransport {
    pub fn new(config: &ClobConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_tokens<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token_ids: &[String],
    ) -> Result<T, TransportError> {
        let body: Vec<TokenRequest<'_>> = token_ids
            .iter()
            .map(|id| TokenRequest { token_id: id })
            .collect();

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl QuoteTransport for HttpQuoteTransport {
    async fn post_prices(&self, token_ids: &[String]) -> Result<QuoteResponse, TransportError> {
        self.post_tokens("/prices", token_ids).await
    }

    async fn post_last_trades(
        &self,
        token_ids: &[String],
    ) -> Result<Vec<LastTradeEntry>, TransportError> {
        self.post_tokens("/last-trades-prices", token_ids).await
    }
}

enum BatchOutcome {
    Priced(QuoteResponse),
    Failed(TransportError),
    Cancelled,
}

/// Price oracle over the CLOB.
pub struct PriceOracle {
    transport: Arc<dyn QuoteTransport>,
    max_batch: usize,
    bus: Arc<EventBus>,
}

impl PriceOracle {
    pub fn new(transport: Arc<dyn QuoteTransport>, max_batch: usize, bus: Arc<EventBus>) -> Self {
        Self {
            transport,
            max_batch: max_batch.max(1),
            bus,
        }
    }

    /// Fetch buy/sell prices for `token_ids`. Every requested token is present
    /// in the result; unpriced tokens carry [`OutcomePrices::FALLBACK`].
    pub async fn fetch_outcome_prices(
        &self,
        token_ids: &[String],
        cancel: &CancellationToken,
    ) -> HashMap<String, OutcomePrices> {
        let unique = unique_tokens(token_ids);
        if unique.is_empty() {
            return HashMap::new();
        }

        let mut prices: HashMap<String, OutcomePrices> = HashMap::with_capacity(unique.len());
        let mut missing: HashSet<String> = unique.iter().cloned().collect();
        let mut cancelled = false;

        for batch in unique.chunks(self.max_batch) {
            match self.fetch_batch(batch, cancel).await {
                BatchOutcome::Priced(data) => apply_quotes(data, &mut prices, &mut missing),
                BatchOutcome::Cancelled => {
                    cancelled = true;
                    break;
                }
                BatchOutcome::Failed(err) => {
                    self.bus.publish(SyncEvent::PriceBatchFailed {
                        tokens: batch.len(),
                        error: err.to_string(),
                    });

                    let retries = join_all(
                        batch
                            .iter()
                            .map(|id| self.fetch_batch(std::slice::from_ref(id), cancel)),
                    )
                    .await;

                    for outcome in retries {
                        match outcome {
                            BatchOutcome::Priced(data) => {
                                apply_quotes(data, &mut prices, &mut missing)
                            }
                            BatchOutcome::Failed(e) => {
                                debug!(error = %e, "single token price request failed");
                            }
                            BatchOutcome::Cancelled => {
                                cancelled = true;
                                break;
                            }
                        }
                    }

                    if cancelled {
                        break;
                    }
                }
            }
        }

        if cancelled {
            self.bus.publish(SyncEvent::PriceFetchCancelled {
                unresolved: missing.len(),
            });
        }

        for token_id in missing {
            prices.insert(token_id, OutcomePrices::FALLBACK);
        }

        prices
    }

    async fn fetch_batch(&self, batch: &[String], cancel: &CancellationToken) -> BatchOutcome {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return BatchOutcome::Cancelled,
            result = self.transport.post_prices(batch) => result,
        };

        match result {
            Ok(data) => BatchOutcome::Priced(data),
            Err(TransportError::Cancelled) => BatchOutcome::Cancelled,
            Err(e) => BatchOutcome::Failed(e),
        }
    }

    /// Fetch the last trade price per token, clamped into [0, 1]. Tokens without
    /// a usable price are absent from the result.
    pub async fn fetch_last_trade_prices(&self, token_ids: &[String]) -> HashMap<String, f64> {
        let unique = unique_tokens(token_ids);
        let mut last_trades = HashMap::new();
        if unique.is_empty() {
            return last_trades;
        }

        let entries = match self.transport.post_last_trades(&unique).await {
            Ok(entries) => entries,
            Err(TransportError::Cancelled) => {
                debug!("last trade price fetch cancelled");
                return last_trades;
            }
            Err(e) => {
                error!(error = %e, tokens = unique.len(), "failed to fetch last trade prices");
                return last_trades;
            }
        };

        for entry in entries {
            let Some(token_id) = entry.token_id.filter(|t| !t.is_empty()) else {
                continue;
            };
            if let Some(price) = entry.price.as_ref().and_then(normalize_trade_price) {
                last_trades.insert(token_id, price);
            }
        }

        last_trades
    }
}

/// Deduplicate, keeping first-seen order and dropping empty ids.
fn unique_tokens(token_ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(token_ids.len());
    token_ids
        .iter()
        .filter(|id| !id.is_empty() && seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Parse a numeric string (or JSON number) into a finite f64.
fn parse_price(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

/// Clamp a last-trade price into [0, 1]; non-numeric values yield `None`.
pub fn normalize_trade_price(value: &Value) -> Option<f64> {
    parse_price(value).map(|p| p.clamp(0.0, 1.0))
}

/// Merge one `/prices` response. The CLOB's SELL side is our buy price and its
/// BUY side our sell price; a single quoted side fills both.
fn apply_quotes(
    data: QuoteResponse,
    prices: &mut HashMap<String, OutcomePrices>,
    missing: &mut HashSet<String>,
) {
    for (token_id, sides) in data {
        let Some(sides) = sides else {
            continue;
        };
        let bid = sides.buy.as_ref().and_then(parse_price);
        let ask = sides.sell.as_ref().and_then(parse_price);

        let (buy, sell) = match (bid, ask) {
            (Some(b), Some(s)) => (s, b),
            (Some(b), None) => (b, b),
            (None, Some(s)) => (s, s),
            (None, None) => continue,
        };

        missing.remove(&token_id);
        prices.insert(token_id, OutcomePrices { buy, sell });
    }
}
