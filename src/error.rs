//! Unified error types for the catalog service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Generic message shown to HTTP clients on internal failure.
pub const DEFAULT_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Failure reported by a [`CatalogStore`](crate::db::store::CatalogStore) call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store refused the statement (constraint, type, syntax).
    #[error("rejected by store: {0}")]
    Rejected(String),

    /// The store could not be reached at all (connectivity, pool exhaustion).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Protocol(_)
            | sqlx::Error::Configuration(_) => StoreError::Unavailable(e.to_string()),
            other => StoreError::Rejected(other.to_string()),
        }
    }
}

/// Errors surfaced by the sync trigger.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("failed to fetch polymarket events or no events found")]
    NoEvents,

    #[error("sync failed: {0}")]
    Internal(#[from] CatalogError),
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            SyncError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthenticated."),
            SyncError::NoEvents => (
                StatusCode::BAD_GATEWAY,
                "Failed to fetch polymarket events or no events found",
            ),
            SyncError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, DEFAULT_ERROR_MESSAGE),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Errors surfaced by the read API. Internal detail never reaches the client.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(#[from] CatalogError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                DEFAULT_ERROR_MESSAGE.to_string(),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
