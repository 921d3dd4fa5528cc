//! Collection agent.
//!
//! Runs on each monitored host. Every poll it reads the kernel ring buffer,
//! keeps the lines newer than the last acknowledged timestamp, and posts them
//! to the collector as one [`Delta`]. The high-water mark only advances after
//! the collector answers 200, so a failed delivery is retried on the next
//! poll with the same lines (plus anything newer).

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use reqwest::StatusCode;

use crate::config::AgentConfig;
use crate::dmesg::{self, MAX_LINES};
use crate::models::Delta;
use crate::state;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one collection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing newer than the high-water mark.
    NothingNew,
    /// Lines delivered and acknowledged.
    Sent { lines: usize },
}

pub struct Agent {
    client: reqwest::Client,
    config: AgentConfig,
    hostname: String,
}

impl Agent {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            bail!("agent credential not set: export the collector's shared secret");
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.tls_skip_verify)
            .build()
            .context("failed to build HTTP client")?;

        let hostname = config.hostname.clone().unwrap_or_else(system_hostname);

        Ok(Self {
            client,
            config: config.clone(),
            hostname,
        })
    }

    /// Poll until Ctrl-C. Individual poll failures are logged, not fatal.
    pub async fn run(&self) -> Result<()> {
        if self.config.tls_skip_verify {
            tracing::warn!("TLS certificate verification disabled");
        }
        tracing::info!(
            hostname = %self.hostname,
            collector = %self.config.collector_url,
            interval_secs = self.config.poll_interval_secs,
            "agent started"
        );

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.collect_once().await {
                        Ok(PollOutcome::NothingNew) => tracing::debug!("no new lines"),
                        Ok(PollOutcome::Sent { lines }) => tracing::info!(lines, "delta delivered"),
                        Err(e) => tracing::warn!(error = %format!("{:#}", e), "collection failed"),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("agent shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Read the kernel ring buffer and ship whatever is new.
    pub async fn collect_once(&self) -> Result<PollOutcome> {
        let lines = dmesg::read_dmesg().await?;
        self.ship(&lines).await
    }

    /// Filter, cap, and deliver `lines`, then advance the high-water mark.
    pub async fn ship(&self, lines: &[String]) -> Result<PollOutcome> {
        let last_seen = state::read_last_timestamp(&self.config.state_file)?;
        let (new_lines, newest) = dmesg::filter_new_lines(lines, last_seen);
        let Some(newest) = newest else {
            return Ok(PollOutcome::NothingNew);
        };

        let new_lines = dmesg::cap_lines(new_lines, MAX_LINES);
        let count = new_lines.len();

        let delta = Delta {
            hostname: self.hostname.clone(),
            timestamp: Some(Utc::now()),
            lines: new_lines,
        };
        self.send(&delta).await?;

        state::write_last_timestamp(&self.config.state_file, newest)?;
        Ok(PollOutcome::Sent { lines: count })
    }

    async fn send(&self, delta: &Delta) -> Result<()> {
        let response = self
            .client
            .post(&self.config.collector_url)
            .bearer_auth(&self.config.api_key)
            .json(delta)
            .send()
            .await
            .with_context(|| format!("failed to reach collector at {}", self.config.collector_url))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            bail!("collector returned {}: {}", status, body.trim());
        }
        Ok(())
    }
}

fn system_hostname() -> String {
    ["/proc/sys/kernel/hostname", "/etc/hostname"]
        .iter()
        .filter_map(|p| std::fs::read_to_string(p).ok())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
