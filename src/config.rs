//! Configuration: TOML file defaults + environment variable overrides.
//!
//! Tunables live in `config/default.toml`.
//! Secrets (database URL, cron secret) come from environment variables.

use serde::Deserialize;
use std::env;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gamma: GammaConfig,
    #[serde(default)]
    pub clob: ClobConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GammaConfig {
    #[serde(default = "default_gamma_url")]
    pub base_url: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    #[serde(default = "default_gamma_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for GammaConfig {
    fn default() -> Self {
        Self {
            base_url: default_gamma_url(),
            page_limit: default_page_limit(),
            request_timeout_ms: default_gamma_timeout(),
        }
    }
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".into()
}
fn default_page_limit() -> usize {
    50
}
fn default_gamma_timeout() -> u64 {
    15_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClobConfig {
    #[serde(default = "default_clob_url")]
    pub base_url: String,
    #[serde(default = "default_max_price_batch")]
    pub max_price_batch: usize,
    #[serde(default = "default_clob_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for ClobConfig {
    fn default() -> Self {
        Self {
            base_url: default_clob_url(),
            max_price_batch: default_max_price_batch(),
            request_timeout_ms: default_clob_timeout(),
        }
    }
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".into()
}
fn default_max_price_batch() -> usize {
    500
}
fn default_clob_timeout() -> u64 {
    10_000
}

/// How the ingestion run reacts when the store rejects one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertPolicy {
    /// Log the rejected batch and keep going.
    #[default]
    BestEffort,
    /// Abort the run on the first rejected batch.
    FailFast,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub upsert_policy: UpsertPolicy,
    #[serde(default)]
    pub cron_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_page_size")]
    pub page_size: i64,
    #[serde(default = "default_trending_window")]
    pub trending_window_hours: i64,
    pub image_base_url: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            page_size: default_catalog_page_size(),
            trending_window_hours: default_trending_window(),
            image_base_url: None,
        }
    }
}

fn default_catalog_page_size() -> i64 {
    40
}
fn default_trending_window() -> i64 {
    72
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_output: false,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from `config/default.toml` merged with env vars.
    /// Overrides use the `PM__` prefix, e.g. `PM__WEB__PORT=9000`.
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("PM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: Config = builder.try_deserialize()?;

        // Secrets never live in TOML
        if let Ok(v) = env::var("DATABASE_URL") {
            cfg.database.url = v;
        }
        if let Ok(v) = env::var("CRON_SECRET") {
            cfg.sync.cron_secret = v;
        }

        if cfg.database.url.is_empty() {
            anyhow::bail!("DATABASE_URL is not set");
        }
        if cfg.gamma.page_limit == 0 || cfg.clob.max_price_batch == 0 {
            anyhow::bail!("gamma.page_limit and clob.max_price_batch must be positive");
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.gamma.page_limit, 50);
        assert_eq!(cfg.clob.max_price_batch, 500);
        assert_eq!(cfg.catalog.page_size, 40);
        assert_eq!(cfg.sync.upsert_policy, UpsertPolicy::BestEffort);
    }

    #[test]
    fn upsert_policy_parses_snake_case() {
        let cfg: SyncConfig =
            serde_json::from_str(r#"{"upsert_policy":"fail_fast"}"#).unwrap();
        assert_eq!(cfg.upsert_policy, UpsertPolicy::FailFast);
    }
}
