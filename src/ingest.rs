//! The ingestion endpoint: `POST /ingest`.
//!
//! Each request passes through a fixed sequence of gates before anything is
//! analyzed or stored:
//!
//! 1. bearer secret must match exactly (constant-time compare), else 401
//! 2. declared `Content-Length` must not exceed the limit, else 413
//! 3. the body is read through a `max + 1` byte cap, so a request that lies
//!    about its length is still bounded and rejected with 413
//! 4. the body must decode into a [`Delta`], else 400
//! 5. a delta with no lines is acknowledged as `skipped` and not stored
//!
//! Past the gates the delta is analyzed and a record is written no matter
//! how the analysis ended. The caller gets 200 once the record is durable;
//! only a failed write produces a 500.
//!
//! Analysis and persistence run on a spawned task tied to the request by a
//! cancellation token. If the caller disconnects, the in-flight analysis
//! (and its outbound HTTP request) is dropped and the raw input is still
//! written as `llm_unavailable`.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::coordinator::{Analysis, FallbackCoordinator};
use crate::error::AnalysisError;
use crate::models::{Delta, NewRecord, RecordStatus, StoredRecord};
use crate::server::{self, AppError};
use crate::store::ResultStore;

/// Everything an ingestion call needs, fixed at startup.
#[derive(Clone)]
pub struct IngestState {
    pub store: Arc<dyn ResultStore>,
    pub coordinator: Arc<FallbackCoordinator>,
    pub api_key: Arc<str>,
    pub max_payload_bytes: usize,
}

/// JSON body returned on 200.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl IngestResponse {
    fn skipped() -> Self {
        Self {
            status: "skipped".to_string(),
            latency_ms: 0,
            reason: Some("no lines".to_string()),
        }
    }
}

/// Handler for `POST /ingest`.
pub async fn handle_ingest(
    State(state): State<IngestState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<IngestResponse>, AppError> {
    if !is_authorized(&headers, &state.api_key) {
        return Err(server::unauthorized());
    }

    if declared_length(&headers).is_some_and(|len| len > state.max_payload_bytes as u64) {
        return Err(server::payload_too_large(state.max_payload_bytes));
    }

    let bytes = read_limited(body, state.max_payload_bytes).await?;

    let delta: Delta = serde_json::from_slice(&bytes)
        .map_err(|e| server::bad_request(format!("invalid JSON: {}", e)))?;

    if delta.lines.is_empty() {
        tracing::debug!(source = %delta.hostname, "empty delta acknowledged");
        return Ok(Json(IngestResponse::skipped()));
    }

    let span = tracing::info_span!(
        "ingest",
        request_id = %Uuid::new_v4(),
        source = %delta.hostname,
        lines = delta.lines.len(),
    );

    // Dropping this handler future (caller gone) cancels the token.
    let token = CancellationToken::new();
    let _cancel_on_drop = token.clone().drop_guard();

    let task = tokio::spawn(process_delta(state, delta, token).instrument(span));

    match task.await {
        Ok(Ok(stored)) => Ok(Json(IngestResponse {
            status: stored.status.to_string(),
            latency_ms: stored.latency_ms,
            reason: None,
        })),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "failed to persist ingestion result");
            Err(server::internal("failed to persist result"))
        }
        Err(e) => {
            tracing::error!(error = %e, "ingestion task aborted");
            Err(server::internal("failed to persist result"))
        }
    }
}

/// Analyze one delta and persist the outcome, whatever it was.
async fn process_delta(
    state: IngestState,
    delta: Delta,
    cancel: CancellationToken,
) -> anyhow::Result<StoredRecord> {
    let received_at = Utc::now();
    let started = Instant::now();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AnalysisError::Cancelled {
            latency_ms: started.elapsed().as_millis() as u64,
        }),
        analysis = state.coordinator.analyze(&delta.lines) => analysis,
    };

    log_outcome(&outcome);

    let record = build_record(&delta, received_at, outcome);
    match state.store.insert(&record).await {
        Ok(stored) => {
            tracing::info!(
                id = stored.id,
                status = %stored.status,
                latency_ms = stored.latency_ms,
                "result stored"
            );
            Ok(stored)
        }
        Err(e) => {
            if cancel.is_cancelled() {
                tracing::error!(error = %e, "failed to store result after caller disconnected");
            }
            Err(e)
        }
    }
}

fn log_outcome(outcome: &Result<Analysis, AnalysisError>) {
    match outcome {
        Ok(analysis) => tracing::debug!(
            endpoint = analysis.endpoint_index + 1,
            issues = analysis.result.issues.len(),
            "analysis complete"
        ),
        Err(e) if e.is_unavailable() => {
            tracing::warn!(error = %e, "LLM unavailable, raw input preserved")
        }
        Err(AnalysisError::Cancelled { .. }) => {
            tracing::warn!("caller disconnected during analysis, raw input preserved")
        }
        Err(e) => tracing::warn!(error = %e, "LLM analysis failed"),
    }
}

/// Map an analysis outcome onto the record that will be stored.
///
/// The raw lines and the accumulated latency are kept on every path.
pub fn build_record(
    delta: &Delta,
    received_at: DateTime<Utc>,
    outcome: Result<Analysis, AnalysisError>,
) -> NewRecord {
    let (status, issues, latency_ms) = match outcome {
        Ok(analysis) => (
            RecordStatus::from(analysis.result.status),
            analysis.result.issues,
            analysis.latency_ms,
        ),
        Err(e) => {
            let status = match e {
                AnalysisError::AllUnavailable { .. } | AnalysisError::Cancelled { .. } => {
                    RecordStatus::LlmUnavailable
                }
                AnalysisError::NoEndpoints | AnalysisError::Terminal { .. } => RecordStatus::Error,
            };
            (status, Vec::new(), e.latency_ms())
        }
    };

    NewRecord {
        timestamp: delta.timestamp.unwrap_or(received_at),
        source: delta.hostname.clone(),
        status,
        issues,
        raw_text: delta.raw_text(),
        latency_ms,
    }
}

/// Exact match of `Authorization: Bearer <secret>`. An empty configured
/// secret never matches.
fn is_authorized(headers: &HeaderMap, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return false;
    };
    bool::from(token.as_bytes().ct_eq(expected.as_bytes()))
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Read the body through a `max + 1` cap so an over-limit body is detected
/// rather than silently truncated.
async fn read_limited(body: Body, max: usize) -> Result<Bytes, AppError> {
    let collected = Limited::new(body, max.saturating_add(1))
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                server::payload_too_large(max)
            } else {
                server::bad_request("failed to read body")
            }
        })?;

    let bytes = collected.to_bytes();
    if bytes.len() > max {
        return Err(server::payload_too_large(max));
    }
    Ok(bytes)
}
