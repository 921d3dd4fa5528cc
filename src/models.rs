//! Core data models used throughout logsift.
//!
//! These types represent the deltas, analysis results, and stored records
//! that flow through the ingestion pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One batch of new log lines from one source, as sent by an agent.
///
/// Lines are in chronological order. A delta with no lines is acknowledged
/// without analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub hostname: String,
    /// Client-supplied send time. Receipt time is used when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// A missing or `null` list decodes as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub lines: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Delta {
    /// The lines joined with newlines, exactly as they are stored.
    pub fn raw_text(&self) -> String {
        self.lines.join("\n")
    }
}

/// A single anomaly reported by the analysis backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub summary: String,
    #[serde(default)]
    pub evidence: String,
}

/// Severity verdict produced by a successful analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

/// The structured outcome of a successful inference call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub status: Severity,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

/// Status persisted with every record.
///
/// The first three mirror [`Severity`]; `LlmUnavailable` marks input that
/// could not be analyzed and should be reprocessed, `Error` marks input whose
/// analysis was attempted and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Ok,
    Warning,
    Critical,
    LlmUnavailable,
    Error,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Ok => "ok",
            RecordStatus::Warning => "warning",
            RecordStatus::Critical => "critical",
            RecordStatus::LlmUnavailable => "llm_unavailable",
            RecordStatus::Error => "error",
        }
    }
}

impl From<Severity> for RecordStatus {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Ok => RecordStatus::Ok,
            Severity::Warning => RecordStatus::Warning,
            Severity::Critical => RecordStatus::Critical,
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(RecordStatus::Ok),
            "warning" => Ok(RecordStatus::Warning),
            "critical" => Ok(RecordStatus::Critical),
            "llm_unavailable" => Ok(RecordStatus::LlmUnavailable),
            "error" => Ok(RecordStatus::Error),
            other => anyhow::bail!("unknown record status: '{}'", other),
        }
    }
}

/// A record ready to be inserted; the store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub status: RecordStatus,
    pub issues: Vec<Issue>,
    pub raw_text: String,
    pub latency_ms: u64,
}

/// The durable outcome of one ingestion call.
#[derive(Debug, Clone, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub status: RecordStatus,
    pub issues: Vec<Issue>,
    pub raw_text: String,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_status_roundtrips_through_str() {
        for status in [
            RecordStatus::Ok,
            RecordStatus::Warning,
            RecordStatus::Critical,
            RecordStatus::LlmUnavailable,
            RecordStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<RecordStatus>().unwrap(), status);
        }
        assert!("degraded".parse::<RecordStatus>().is_err());
    }

    #[test]
    fn test_analysis_result_parses_backend_json() {
        let json = r#"{"status": "warning", "issues": [{"summary": "ECC error", "evidence": "EDAC MC0: 1 CE"}]}"#;
        let result: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.status, Severity::Warning);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].evidence, "EDAC MC0: 1 CE");
    }

    #[test]
    fn test_analysis_result_rejects_unknown_status() {
        let json = r#"{"status": "llm_unavailable", "issues": []}"#;
        assert!(serde_json::from_str::<AnalysisResult>(json).is_err());
    }

    #[test]
    fn test_delta_timestamp_is_optional() {
        let delta: Delta =
            serde_json::from_str(r#"{"hostname": "web-01", "lines": ["a", "b"]}"#).unwrap();
        assert!(delta.timestamp.is_none());
        assert_eq!(delta.raw_text(), "a\nb");
    }

    #[test]
    fn test_delta_missing_or_null_lines_is_empty() {
        for json in [
            r#"{"hostname": "web-01"}"#,
            r#"{"hostname": "web-01", "lines": null}"#,
        ] {
            let delta: Delta = serde_json::from_str(json).unwrap();
            assert!(delta.lines.is_empty(), "{}", json);
        }
        assert!(serde_json::from_str::<Delta>(r#"{"lines": ["a"]}"#).is_err());
        assert!(serde_json::from_str::<Delta>(r#"{"hostname": "h", "lines": "a"}"#).is_err());
    }
}
