//! Agent high-water mark.
//!
//! A single RFC 3339 timestamp in a text file: the newest kernel line the
//! collector has acknowledged. A missing or unreadable file means "nothing
//! delivered yet", so the next run ships the whole buffer.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

pub fn read_last_timestamp(path: &Path) -> Result<Option<DateTime<Utc>>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read state file {}", path.display()))
        }
    };

    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(ts) => Ok(Some(ts.with_timezone(&Utc))),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt state file, starting over");
            Ok(None)
        }
    }
}

pub fn write_last_timestamp(path: &Path, ts: DateTime<Utc>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
        .with_context(|| format!("failed to write state file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let got = read_last_timestamp(&tmp.path().join("absent")).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn test_corrupt_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state");
        std::fs::write(&path, "yesterday-ish").unwrap();
        assert!(read_last_timestamp(&path).unwrap().is_none());
    }

    #[test]
    fn test_write_creates_parent_dirs_and_reads_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("var").join("lib").join("last_timestamp");
        let ts = Utc.with_ymd_and_hms(2026, 2, 3, 12, 30, 0).unwrap();

        write_last_timestamp(&path, ts).unwrap();
        assert_eq!(read_last_timestamp(&path).unwrap(), Some(ts));
    }
}
