//! Polymarket Catalog: Entry Point
//!
//! Loads configuration, wires the sync pipeline and read path onto a shared
//! Postgres pool, and serves the HTTP API. Handles graceful shutdown on
//! SIGINT/SIGTERM.

mod auth;
mod catalog;
mod clob;
mod config;
mod db;
mod error;
mod events;
mod ingest;
mod logging;
mod web;

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::catalog::aggregator::EventAggregator;
use crate::clob::prices::{HttpQuoteTransport, PriceOracle};
use crate::config::Config;
use crate::db::pool;
use crate::db::store::{CatalogStore, PgStore};
use crate::events::bus::EventBus;
use crate::ingest::gamma::GammaClient;
use crate::ingest::pipeline::SyncPipeline;
use crate::web::server::{AppState, WebServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (ignore if missing)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    logging::structured::init_logging(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        upsert_policy = ?config.sync.upsert_policy,
        gamma = %config.gamma.base_url,
        clob = %config.clob.base_url,
        "polymarket-catalog starting"
    );
    if config.sync.cron_secret.is_empty() {
        error!("CRON_SECRET is not set, sync trigger will reject every caller");
    }

    // Database
    let db_pool = pool::create_pool(&config.database).await?;
    pool::run_migrations(&db_pool).await?;
    let store: Arc<dyn CatalogStore> = Arc::new(PgStore::new(db_pool));

    let event_bus = Arc::new(EventBus::default());

    // Pricing
    let transport = Arc::new(HttpQuoteTransport::new(&config.clob)?);
    let oracle = Arc::new(PriceOracle::new(
        transport,
        config.clob.max_price_batch,
        event_bus.clone(),
    ));

    // Ingestion
    let gamma = Arc::new(GammaClient::new(&config.gamma)?);
    let pipeline = Arc::new(SyncPipeline::new(
        gamma,
        store.clone(),
        event_bus.clone(),
        config.gamma.page_limit,
        config.sync.upsert_policy,
    ));

    // Read path
    let aggregator = Arc::new(EventAggregator::new(
        store.clone(),
        oracle.clone(),
        &config.catalog,
    ));

    let shutdown = CancellationToken::new();
    let state = AppState {
        store,
        aggregator,
        pipeline,
        oracle,
        cron_secret: Arc::from(config.sync.cron_secret.as_str()),
        shutdown: shutdown.clone(),
    };

    let server = WebServer::new(config.web.clone(), state);
    let mut server_handle = tokio::spawn(server.start());

    let server_exited = tokio::select! {
        res = wait_for_signal() => {
            res?;
            false
        }
        joined = &mut server_handle => {
            report_server_exit(joined);
            true
        }
    };

    if !server_exited {
        info!("shutdown signal received");
        shutdown.cancel();
        report_server_exit(server_handle.await);
    }

    info!("shutdown complete");
    Ok(())
}

fn report_server_exit(joined: Result<anyhow::Result<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "web server error"),
        Err(e) => error!(error = %e, "web server task panicked"),
    }
}

async fn wait_for_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = signal::ctrl_c() => res?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    signal::ctrl_c().await?;
    Ok(())
}
