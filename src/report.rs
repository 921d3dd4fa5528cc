//! Operator queries over stored results.
//!
//! Backs `logsift results`, `logsift problems`, and `logsift stats`: recent
//! records for one source, recent non-ok records across the fleet, and
//! per-status totals.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::models::StoredRecord;
use crate::store::{ResultStore, SqliteStore};

/// Default number of records shown by the list commands.
pub const DEFAULT_LIMIT: usize = 20;

/// Print the most recent records for one source, newest first.
pub async fn run_results(config: &Config, source: &str, limit: usize) -> Result<()> {
    let store = SqliteStore::open(&config.db.path).await?;
    let records = store.recent_for_source(source, limit).await?;
    store.close().await;

    if records.is_empty() {
        println!("No results for source '{}'.", source);
        return Ok(());
    }

    print_records(&records, true);
    Ok(())
}

/// Print the most recent records whose status is not `ok`.
pub async fn run_problems(config: &Config, limit: usize) -> Result<()> {
    let store = SqliteStore::open(&config.db.path).await?;
    let records = store.recent_problems(limit).await?;
    store.close().await;

    if records.is_empty() {
        println!("No problems recorded.");
        return Ok(());
    }

    print_records(&records, true);
    Ok(())
}

/// Print per-status totals.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(&config.db.path).await?;
    let counts = store.status_counts().await?;
    store.close().await;

    let total: u64 = counts.values().sum();
    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("logsift — Result Stats");
    println!("======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Records:     {}", total);

    if !counts.is_empty() {
        println!();
        println!("  {:<18} {:>8}", "STATUS", "COUNT");
        println!("  {}", "-".repeat(27));
        for (status, n) in &counts {
            println!("  {:<18} {:>8}", status.as_str(), n);
        }
    }
    println!();

    Ok(())
}

fn print_records(records: &[StoredRecord], with_issues: bool) {
    println!(
        "{:>6}  {:<20} {:<20} {:<16} {:>8}",
        "ID", "TIMESTAMP", "SOURCE", "STATUS", "LATENCY"
    );
    println!("{}", "-".repeat(76));
    for r in records {
        println!(
            "{:>6}  {:<20} {:<20} {:<16} {:>6}ms",
            r.id,
            format_ts(&r.timestamp),
            r.source,
            r.status.as_str(),
            r.latency_ms
        );
        if with_issues {
            for issue in &r.issues {
                println!("        - {}", issue.summary);
                if !issue.evidence.is_empty() {
                    println!("          {}", preview(&issue.evidence, 100));
                }
            }
        }
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// First line of `text`, cut to at most `max` characters.
fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() <= max {
        return line.to_string();
    }
    let cut: String = line.chars().take(max).collect();
    format!("{}…", cut)
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
