//! Error taxonomy for the analysis path.
//!
//! A single attempt against one endpoint fails with a [`ProviderError`],
//! which classifies itself as [`FailureClass::Unavailable`] (advance the
//! chain) or [`FailureClass::Terminal`] (abort the chain). The coordinator
//! surfaces an [`AnalysisError`], which always carries the latency spent
//! before it gave up.
//!
//! Classification uses structured signals only: reqwest's connect/timeout
//! kinds and HTTP status codes.

use reqwest::StatusCode;
use thiserror::Error;

/// Whether a failed attempt should advance the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The provider is down right now; try the next one.
    Unavailable,
    /// The call itself is broken; stop the chain.
    Terminal,
}

/// Failure of a single inference attempt against one endpoint.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("connection failed: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("empty response from API")]
    EmptyResponse,

    #[error("failed to parse LLM response: {0}")]
    Decode(String),

    #[error("request error: {0}")]
    Request(#[source] reqwest::Error),
}

impl ProviderError {
    /// Map a reqwest failure onto the taxonomy.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err)
        } else if err.is_connect() {
            ProviderError::Connect(err)
        } else if err.is_request() || err.is_body() {
            ProviderError::Transport(err)
        } else {
            ProviderError::Request(err)
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            ProviderError::Connect(_) | ProviderError::Timeout(_) | ProviderError::Transport(_) => {
                FailureClass::Unavailable
            }
            ProviderError::Status { status, .. } => {
                if is_unavailable_status(*status) {
                    FailureClass::Unavailable
                } else {
                    FailureClass::Terminal
                }
            }
            ProviderError::EmptyResponse
            | ProviderError::Decode(_)
            | ProviderError::Request(_) => FailureClass::Terminal,
        }
    }
}

fn is_unavailable_status(status: u16) -> bool {
    matches!(
        StatusCode::from_u16(status),
        Ok(StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT)
    )
}

/// Failure of a whole `analyze` call across the fallback chain.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no LLM endpoints configured")]
    NoEndpoints,

    #[error("all LLM endpoints unavailable ({attempts} tried): {last}")]
    AllUnavailable {
        attempts: usize,
        latency_ms: u64,
        #[source]
        last: ProviderError,
    },

    #[error("LLM endpoint {index} ({model}) failed: {source}")]
    Terminal {
        index: usize,
        model: String,
        latency_ms: u64,
        #[source]
        source: ProviderError,
    },

    #[error("analysis cancelled by caller")]
    Cancelled { latency_ms: u64 },
}

impl AnalysisError {
    /// True only when every endpoint was tried and all were unavailable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AnalysisError::AllUnavailable { .. })
    }

    /// Latency accumulated across every attempt made before failing.
    pub fn latency_ms(&self) -> u64 {
        match self {
            AnalysisError::NoEndpoints => 0,
            AnalysisError::AllUnavailable { latency_ms, .. }
            | AnalysisError::Terminal { latency_ms, .. }
            | AnalysisError::Cancelled { latency_ms } => *latency_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ProviderError {
        ProviderError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_gateway_statuses_are_unavailable() {
        for code in [502, 503, 504] {
            assert_eq!(status(code).class(), FailureClass::Unavailable, "{}", code);
        }
    }

    #[test]
    fn test_other_statuses_are_terminal() {
        for code in [400, 401, 404, 429, 500, 501] {
            assert_eq!(status(code).class(), FailureClass::Terminal, "{}", code);
        }
    }

    #[test]
    fn test_decode_and_empty_are_terminal() {
        assert_eq!(ProviderError::EmptyResponse.class(), FailureClass::Terminal);
        assert_eq!(
            ProviderError::Decode("expected value".into()).class(),
            FailureClass::Terminal
        );
    }

    #[test]
    fn test_only_all_unavailable_is_unavailable() {
        let all = AnalysisError::AllUnavailable {
            attempts: 2,
            latency_ms: 40,
            last: status(503),
        };
        assert!(all.is_unavailable());
        assert_eq!(all.latency_ms(), 40);

        let terminal = AnalysisError::Terminal {
            index: 0,
            model: "m".into(),
            latency_ms: 7,
            source: status(400),
        };
        assert!(!terminal.is_unavailable());
        assert_eq!(terminal.latency_ms(), 7);

        assert!(!AnalysisError::NoEndpoints.is_unavailable());
        assert!(!AnalysisError::Cancelled { latency_ms: 3 }.is_unavailable());
    }
}
