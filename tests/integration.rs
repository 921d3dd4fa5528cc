use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{TimeZone, Utc};
use logsift::models::{Issue, NewRecord, RecordStatus};
use logsift::store::{ResultStore, SqliteStore};
use tempfile::TempDir;

const SECRET_ENV: &str = "LOGSIFT_CLI_TEST_SECRET";

fn logsift_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("logsift");
    path
}

fn setup_test_env(endpoints: bool) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let mut config_content = format!(
        r#"[db]
path = "{}/data/logsift.sqlite"

[server]
bind = "127.0.0.1:0"
api_key_env = "{}"
"#,
        root.display(),
        SECRET_ENV
    );
    if endpoints {
        config_content.push_str(
            r#"
[[analysis.endpoints]]
url = "http://127.0.0.1:9/v1"
model = "test-model"
"#,
        );
    }

    let config_path = config_dir.join("logsift.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn db_path(tmp: &TempDir) -> PathBuf {
    tmp.path().join("data").join("logsift.sqlite")
}

fn run_logsift(config_path: &Path, args: &[&str], secret: Option<&str>) -> (String, String, bool) {
    let binary = logsift_binary();
    let mut cmd = Command::new(&binary);
    cmd.arg("--config").arg(config_path).args(args);
    match secret {
        Some(s) => cmd.env(SECRET_ENV, s),
        None => cmd.env_remove(SECRET_ENV),
    };
    let output = cmd
        .output()
        .unwrap_or_else(|e| panic!("Failed to run logsift binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

async fn seed(tmp: &TempDir) {
    let store = SqliteStore::open(&db_path(tmp)).await.unwrap();
    let rows = [
        ("web-01", RecordStatus::Ok, 8),
        ("web-01", RecordStatus::Critical, 9),
        ("db-01", RecordStatus::LlmUnavailable, 10),
        ("db-01", RecordStatus::Ok, 11),
    ];
    for (source, status, hour) in rows {
        let issues = if status == RecordStatus::Critical {
            vec![Issue {
                summary: "Machine check exception".to_string(),
                evidence: "mce: [Hardware Error]: CPU 2: Machine Check".to_string(),
            }]
        } else {
            vec![]
        };
        store
            .insert(&NewRecord {
                timestamp: Utc.with_ymd_and_hms(2026, 2, 3, hour, 0, 0).unwrap(),
                source: source.to_string(),
                status,
                issues,
                raw_text: "[Tue Feb  3 08:00:00 2026] line".to_string(),
                latency_ms: 42,
            })
            .await
            .unwrap();
    }
    store.close().await;
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env(false);

    let (stdout, stderr, success) = run_logsift(&config_path, &["init"], None);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(db_path(&tmp).exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env(false);

    let (_, _, success1) = run_logsift(&config_path, &["init"], None);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_logsift(&config_path, &["init"], None);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_stats_on_empty_database() {
    let (_tmp, config_path) = setup_test_env(false);
    run_logsift(&config_path, &["init"], None);

    let (stdout, stderr, success) = run_logsift(&config_path, &["stats"], None);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Records:     0"), "got: {}", stdout);
}

#[test]
fn test_problems_and_results_on_empty_database() {
    let (_tmp, config_path) = setup_test_env(false);
    run_logsift(&config_path, &["init"], None);

    let (stdout, _, success) = run_logsift(&config_path, &["problems"], None);
    assert!(success);
    assert!(stdout.contains("No problems recorded"));

    let (stdout, _, success) = run_logsift(&config_path, &["results", "web-01"], None);
    assert!(success);
    assert!(stdout.contains("No results for source 'web-01'"));
}

#[tokio::test]
async fn test_reports_over_seeded_results() {
    let (tmp, config_path) = setup_test_env(false);
    seed(&tmp).await;

    let (stdout, _, success) = run_logsift(&config_path, &["stats"], None);
    assert!(success);
    assert!(stdout.contains("Records:     4"), "got: {}", stdout);
    assert!(stdout.contains("llm_unavailable"));
    assert!(stdout.contains("critical"));

    let (stdout, _, success) = run_logsift(&config_path, &["problems"], None);
    assert!(success);
    assert!(stdout.contains("Machine check exception"));
    let unavailable = stdout.find("llm_unavailable").unwrap();
    let critical = stdout.find("critical").unwrap();
    assert!(unavailable < critical, "newest first, got: {}", stdout);
    assert!(!stdout.contains(" ok "), "problems must exclude ok: {}", stdout);

    let (stdout, _, success) = run_logsift(&config_path, &["problems", "--limit", "1"], None);
    assert!(success);
    assert!(stdout.contains("db-01"));
    assert!(!stdout.contains("web-01"));

    let (stdout, _, success) = run_logsift(&config_path, &["results", "web-01"], None);
    assert!(success);
    assert!(stdout.contains("web-01"));
    assert!(!stdout.contains("db-01"));
}

#[test]
fn test_serve_requires_secret() {
    let (_tmp, config_path) = setup_test_env(true);

    let (_, stderr, success) = run_logsift(&config_path, &["serve"], None);
    assert!(!success);
    assert!(stderr.contains(SECRET_ENV), "got: {}", stderr);
}

#[test]
fn test_serve_requires_endpoints() {
    let (_tmp, config_path) = setup_test_env(false);

    let (_, stderr, success) = run_logsift(&config_path, &["serve"], Some("s3cret"));
    assert!(!success);
    assert!(stderr.contains("analysis.endpoints"), "got: {}", stderr);
}

#[test]
fn test_agent_requires_agent_section() {
    let (_tmp, config_path) = setup_test_env(true);

    let (_, stderr, success) = run_logsift(&config_path, &["agent"], Some("s3cret"));
    assert!(!success);
    assert!(stderr.contains("[agent]"), "got: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) =
        run_logsift(&tmp.path().join("nope.toml"), &["stats"], None);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
