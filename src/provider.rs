//! Inference provider abstraction and the OpenAI-compatible HTTP client.
//!
//! An [`AnalysisProvider`] performs exactly one inference attempt against
//! one [`Endpoint`] and reports how long it took, whether it succeeded or
//! not. It holds no mutable state; walking the chain of endpoints is the
//! job of [`FallbackCoordinator`](crate::coordinator::FallbackCoordinator).
//!
//! # Wire format
//!
//! Requests go to `POST {endpoint.url}/chat/completions` with a bearer
//! credential and a chat-completions body:
//!
//! ```json
//! {
//!   "model": "...",
//!   "messages": [
//!     { "role": "system", "content": "<reviewer instructions>" },
//!     { "role": "user", "content": "<lines joined by \\n>" }
//!   ],
//!   "max_tokens": 1024
//! }
//! ```
//!
//! The first choice's `message.content` must itself be a JSON document
//! matching [`AnalysisResult`].
//!
//! # Classification
//!
//! | Outcome | Class |
//! |---------|-------|
//! | connect error, timeout, transport error | Unavailable |
//! | HTTP 502 / 503 / 504 | Unavailable |
//! | any other non-2xx | Terminal |
//! | zero choices, undecodable content | Terminal |

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::config::{AnalysisConfig, EndpointConfig};
use crate::error::ProviderError;
use crate::models::AnalysisResult;

/// Instructions sent as the system message on every request.
pub const SYSTEM_PROMPT: &str = r#"You review Linux kernel ring buffer (dmesg) output collected from bare metal servers. Report messages that point to:

- Memory faults (MCE, EDAC, rising ECC correction counts)
- Storage degradation (NVMe controller warnings, SMART predictive failures, I/O errors)
- Network trouble (link flaps, PCIe retraining, firmware errors)
- Thermal events (throttling, over-temperature warnings)
- Unstable drivers (repeated initialisation, recurring timeouts)

Treat routine noise as ok: ACPI information, systemd lifecycle, USB enumeration, ordinary driver init.

Answer with JSON only, in exactly this shape:
{"status": "ok" | "warning" | "critical", "issues": [{"summary": "short description", "evidence": "the relevant log line"}]}

When nothing stands out, answer {"status": "ok", "issues": []}"#;

/// Bytes of an error response body kept for diagnostics.
const MAX_ERROR_BODY: usize = 512;
/// Completions larger than this are rejected unread.
const MAX_RESPONSE_BODY: usize = 1 << 20;

/// One configured inference provider.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    pub model: String,
    pub api_key: String,
}

impl From<&EndpointConfig> for Endpoint {
    fn from(cfg: &EndpointConfig) -> Self {
        Self {
            url: cfg.url.clone(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
        }
    }
}

/// Result of a single attempt. Latency is reported on both paths.
#[derive(Debug)]
pub struct Attempt {
    pub latency_ms: u64,
    pub outcome: std::result::Result<AnalysisResult, ProviderError>,
}

/// Executes one inference attempt against one endpoint.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn attempt(&self, endpoint: &Endpoint, lines: &[String]) -> Attempt;
}

/// OpenAI-compatible chat-completions client.
pub struct HttpProvider {
    client: reqwest::Client,
    max_tokens: u32,
}

impl HttpProvider {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        Self::with_timeouts(
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
            config.max_tokens,
        )
    }

    pub fn with_timeouts(timeout: Duration, connect_timeout: Duration, max_tokens: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client, max_tokens })
    }

    async fn send(
        &self,
        endpoint: &Endpoint,
        lines: &[String],
    ) -> std::result::Result<AnalysisResult, ProviderError> {
        let body = serde_json::json!({
            "model": endpoint.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": lines.join("\n") },
            ],
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(completions_url(&endpoint.url))
            .header("Authorization", format!("Bearer {}", endpoint.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let mut body = match read_capped(response, MAX_ERROR_BODY).await {
                Ok((bytes, _)) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(_) => String::new(),
            };
            truncate_at_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let too_large =
            || ProviderError::Decode(format!("response exceeds {} bytes", MAX_RESPONSE_BODY));
        if response
            .content_length()
            .is_some_and(|len| len > MAX_RESPONSE_BODY as u64)
        {
            return Err(too_large());
        }
        let (bytes, truncated) = read_capped(response, MAX_RESPONSE_BODY)
            .await
            .map_err(ProviderError::from_reqwest)?;
        if truncated {
            return Err(too_large());
        }
        parse_completion(&bytes)
    }
}

#[async_trait]
impl AnalysisProvider for HttpProvider {
    async fn attempt(&self, endpoint: &Endpoint, lines: &[String]) -> Attempt {
        let start = Instant::now();
        let outcome = self.send(endpoint, lines).await;
        Attempt {
            latency_ms: start.elapsed().as_millis() as u64,
            outcome,
        }
    }
}

/// Read at most `max` bytes of the body. The flag is set when the body had
/// more to give.
async fn read_capped(
    mut response: reqwest::Response,
    max: usize,
) -> std::result::Result<(Vec<u8>, bool), reqwest::Error> {
    let mut buf = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = max - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, false))
}

fn completions_url(base: &str) -> String {
    format!("{}/chat/completions", base.trim_end_matches('/'))
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Decode a chat-completions body into an [`AnalysisResult`].
fn parse_completion(bytes: &[u8]) -> std::result::Result<AnalysisResult, ProviderError> {
    let completion: CompletionResponse =
        serde_json::from_slice(bytes).map_err(|e| ProviderError::Decode(e.to_string()))?;

    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyResponse)?;

    let content = choice.message.content.unwrap_or_default();
    serde_json::from_str(strip_code_fence(&content))
        .map_err(|e| ProviderError::Decode(e.to_string()))
}

/// Models sometimes wrap JSON in a markdown fence; peel it off.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
