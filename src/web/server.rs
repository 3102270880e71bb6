//! Axum HTTP server for the catalog API.

use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::catalog::aggregator::EventAggregator;
use crate::clob::prices::PriceOracle;
use crate::config::WebConfig;
use crate::db::store::CatalogStore;
use crate::ingest::pipeline::SyncPipeline;

use super::routes;

/// Shared state for all web routes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
    pub aggregator: Arc<EventAggregator>,
    pub pipeline: Arc<SyncPipeline>,
    pub oracle: Arc<PriceOracle>,
    pub cron_secret: Arc<str>,
    /// Cancelled on shutdown; request-scoped price fetches hang off it.
    pub shutdown: CancellationToken,
}

pub struct WebServer {
    config: WebConfig,
    state: AppState,
}

impl WebServer {
    pub fn new(config: WebConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn router(state: AppState) -> Router {
        Router::new().merge(routes::api_routes()).with_state(state)
    }

    /// Serve until the shutdown token is cancelled.
    pub async fn start(self) -> anyhow::Result<()> {
        let shutdown = self.state.shutdown.clone();
        let app = Self::router(self.state);

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.port));
        info!(port = self.config.port, "catalog api starting");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("catalog api stopped");
        Ok(())
    }
}
