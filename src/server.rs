//! Collector HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ingest` | Accept a log delta from an agent |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Error responses share one envelope:
//!
//! ```json
//! { "error": { "code": "payload_too_large", "message": "payload exceeds 1048576 bytes" } }
//! ```
//!
//! Error codes: `unauthorized` (401), `bad_request` (400),
//! `payload_too_large` (413), `internal` (500).
//!
//! TLS is expected to be terminated in front of the collector.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::coordinator::FallbackCoordinator;
use crate::ingest::{handle_ingest, IngestState};
use crate::store::{ResultStore, SqliteStore};

/// Fixed path agents post deltas to.
pub const INGEST_PATH: &str = "/ingest";

/// Build the collector router around an already-constructed state.
pub fn build_router(state: IngestState) -> Router {
    Router::new()
        .route(INGEST_PATH, post(handle_ingest))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the collector.
///
/// Opens the result store, builds the fallback chain from configuration,
/// and serves until Ctrl-C, then drains in-flight requests and closes the
/// database.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    config.validate_collector()?;

    let store = Arc::new(SqliteStore::open(&config.db.path).await?);
    let coordinator = Arc::new(FallbackCoordinator::from_config(&config.analysis)?);

    for (i, ep) in coordinator.endpoints().iter().enumerate() {
        tracing::info!(position = i + 1, model = %ep.model, url = %ep.url, "LLM endpoint");
    }

    let state = IngestState {
        store: store.clone() as Arc<dyn ResultStore>,
        coordinator,
        api_key: Arc::from(config.server.api_key.as_str()),
        max_payload_bytes: config.server.max_payload_bytes,
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "collector listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("collector shutting down");
    store.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// 401 with no hint about which part of the check failed.
pub(crate) fn unauthorized() -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: "unauthorized".to_string(),
    }
}

pub(crate) fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

pub(crate) fn payload_too_large(max: usize) -> AppError {
    AppError {
        status: StatusCode::PAYLOAD_TOO_LARGE,
        code: "payload_too_large",
        message: format!("payload exceeds {} bytes", max),
    }
}

pub(crate) fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
