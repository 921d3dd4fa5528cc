//! Ordered fallback across inference endpoints.
//!
//! The coordinator walks its endpoint list strictly in configuration order,
//! one attempt at a time, starting from the first endpoint on every call.
//! There is no health memory between calls: the list is immutable after
//! construction, so one instance can be shared across concurrent requests.
//!
//! ```text
//! analyze(lines)
//!   for each endpoint in order:
//!     attempt ──▶ ok          → return result + summed latency
//!             ──▶ unavailable → remember error, next endpoint
//!             ──▶ terminal    → return error (chain stops)
//!   exhausted  → AllUnavailable(last error)
//! ```

use std::sync::Arc;

use anyhow::Result;

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, FailureClass};
use crate::models::AnalysisResult;
use crate::provider::{AnalysisProvider, Endpoint, HttpProvider};

/// A successful analysis and what it cost.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub result: AnalysisResult,
    /// Sum of the latency of every attempt made, including failed ones.
    pub latency_ms: u64,
    /// Index of the endpoint that produced the result.
    pub endpoint_index: usize,
}

pub struct FallbackCoordinator {
    endpoints: Arc<[Endpoint]>,
    provider: Arc<dyn AnalysisProvider>,
}

impl FallbackCoordinator {
    pub fn new(endpoints: Vec<Endpoint>, provider: Arc<dyn AnalysisProvider>) -> Self {
        Self {
            endpoints: endpoints.into(),
            provider,
        }
    }

    /// Build the coordinator the collector runs with: the configured chain
    /// over the HTTP provider.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        let endpoints = config.endpoints.iter().map(Endpoint::from).collect();
        let provider = HttpProvider::new(config)?;
        Ok(Self::new(endpoints, Arc::new(provider)))
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub async fn analyze(&self, lines: &[String]) -> std::result::Result<Analysis, AnalysisError> {
        if self.endpoints.is_empty() {
            return Err(AnalysisError::NoEndpoints);
        }

        let mut total_latency: u64 = 0;
        let mut last_err = None;

        for (index, endpoint) in self.endpoints.iter().enumerate() {
            let attempt = self.provider.attempt(endpoint, lines).await;
            total_latency += attempt.latency_ms;

            let err = match attempt.outcome {
                Ok(result) => {
                    if index > 0 {
                        tracing::info!(
                            endpoint = index + 1,
                            model = %endpoint.model,
                            failed_before = index,
                            "LLM fallback recovered"
                        );
                    }
                    return Ok(Analysis {
                        result,
                        latency_ms: total_latency,
                        endpoint_index: index,
                    });
                }
                Err(err) => err,
            };

            match err.class() {
                FailureClass::Unavailable => {
                    tracing::warn!(
                        endpoint = index + 1,
                        model = %endpoint.model,
                        error = %err,
                        "LLM endpoint unavailable, trying next"
                    );
                    last_err = Some(err);
                }
                FailureClass::Terminal => {
                    return Err(AnalysisError::Terminal {
                        index,
                        model: endpoint.model.clone(),
                        latency_ms: total_latency,
                        source: err,
                    });
                }
            }
        }

        match last_err {
            Some(last) => Err(AnalysisError::AllUnavailable {
                attempts: self.endpoints.len(),
                latency_ms: total_latency,
                last,
            }),
            // Unreachable with a non-empty chain; every iteration either
            // returns or records an error.
            None => Err(AnalysisError::NoEndpoints),
        }
    }
}
