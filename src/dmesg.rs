//! Kernel ring buffer collection for the agent.
//!
//! Lines come from `dmesg -T` under the C locale, so every line that carries
//! a timestamp starts with `[Www Mmm dd hh:mm:ss yyyy]`. The agent only ships
//! lines strictly newer than the last timestamp it delivered.

use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tokio::process::Command;

/// Upper bound on lines shipped in one delta. The newest lines are kept.
pub const MAX_LINES: usize = 500;

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[([A-Za-z]{3} [A-Za-z]{3} [ \d]\d \d{2}:\d{2}:\d{2} \d{4})\]")
            .expect("timestamp pattern is valid")
    })
}

/// Extract the human-readable timestamp from a `dmesg -T` line.
///
/// The kernel prints local wall-clock time without a zone; it is treated as
/// UTC, which matches what the agent persists as its high-water mark.
pub fn parse_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let caps = timestamp_re().captures(line)?;
    let raw = caps.get(1)?.as_str();
    NaiveDateTime::parse_from_str(raw, "%a %b %e %H:%M:%S %Y")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Keep lines strictly after `last_seen` and report the newest timestamp.
///
/// Lines without a parseable timestamp are dropped. With no `last_seen`,
/// every timestamped line is new. The returned timestamp is `None` only when
/// nothing was kept.
pub fn filter_new_lines(
    lines: &[String],
    last_seen: Option<DateTime<Utc>>,
) -> (Vec<String>, Option<DateTime<Utc>>) {
    let mut kept = Vec::new();
    let mut newest: Option<DateTime<Utc>> = None;

    for line in lines {
        let Some(ts) = parse_timestamp(line) else {
            continue;
        };
        if last_seen.is_some_and(|seen| ts <= seen) {
            continue;
        }
        kept.push(line.clone());
        if newest.map_or(true, |n| ts > n) {
            newest = Some(ts);
        }
    }

    (kept, newest)
}

/// Trim to the last `max` lines.
pub fn cap_lines(mut lines: Vec<String>, max: usize) -> Vec<String> {
    if lines.len() > max {
        lines.drain(..lines.len() - max);
    }
    lines
}

/// Run `dmesg -T` and return its output lines.
pub async fn read_dmesg() -> Result<Vec<String>> {
    let output = Command::new("dmesg")
        .arg("-T")
        .env("LC_ALL", "C")
        .output()
        .await
        .context("failed to run dmesg")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("dmesg exited with {}: {}", output.status, stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
