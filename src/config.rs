use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub agent: Option<AgentConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/logsift.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Name of the environment variable holding the shared ingestion secret.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    /// Resolved from `api_key_env` at load time.
    #[serde(skip)]
    pub api_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_key_env: default_api_key_env(),
            max_payload_bytes: default_max_payload_bytes(),
            api_key: String::new(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:9311".to_string()
}
fn default_api_key_env() -> String {
    "LOGSIFT_API_KEY".to_string()
}
fn default_max_payload_bytes() -> usize {
    1 << 20
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Ordered fallback chain; index 0 is always tried first.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_tokens: default_max_tokens(),
            endpoints: Vec::new(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct EndpointConfig {
    pub url: String,
    pub model: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(skip)]
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub collector_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub tls_skip_verify: bool,
    #[serde(skip)]
    pub api_key: String,
}

fn default_poll_interval_secs() -> u64 {
    300
}
fn default_state_file() -> PathBuf {
    PathBuf::from("/var/lib/logsift/last_timestamp")
}

impl Config {
    /// Checks the settings `logsift serve` cannot run without.
    pub fn validate_collector(&self) -> Result<()> {
        if self.server.api_key.is_empty() {
            bail!(
                "ingestion secret not set: export {} before starting the collector",
                self.server.api_key_env
            );
        }
        if self.analysis.endpoints.is_empty() {
            bail!("analysis.endpoints must list at least one endpoint");
        }
        Ok(())
    }

    /// Returns the agent section, checking the settings `logsift agent` needs.
    pub fn agent_settings(&self) -> Result<&AgentConfig> {
        let agent = self
            .agent
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[agent] section missing from config"))?;
        if agent.collector_url.trim().is_empty() {
            bail!("agent.collector_url must not be empty");
        }
        if agent.poll_interval_secs == 0 {
            bail!("agent.poll_interval_secs must be > 0");
        }
        Ok(agent)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.server.max_payload_bytes == 0 {
        bail!("server.max_payload_bytes must be > 0");
    }
    if config.analysis.timeout_secs == 0 {
        bail!("analysis.timeout_secs must be > 0");
    }
    if config.analysis.connect_timeout_secs == 0 {
        bail!("analysis.connect_timeout_secs must be > 0");
    }

    for (i, ep) in config.analysis.endpoints.iter().enumerate() {
        if ep.url.trim().is_empty() {
            bail!("analysis.endpoints[{}].url must not be empty", i);
        }
        if ep.model.trim().is_empty() {
            bail!("analysis.endpoints[{}].model must not be empty", i);
        }
    }

    resolve_secrets(&mut config);

    Ok(config)
}

/// Secrets never live in the file; pull them from the environment.
fn resolve_secrets(config: &mut Config) {
    config.server.api_key = std::env::var(&config.server.api_key_env).unwrap_or_default();

    for ep in &mut config.analysis.endpoints {
        if let Some(var) = &ep.api_key_env {
            ep.api_key = std::env::var(var).unwrap_or_default();
        }
    }

    if let Some(agent) = config.agent.as_mut() {
        agent.api_key = std::env::var(&config.server.api_key_env).unwrap_or_default();
        if let Ok(hostname) = std::env::var("LOGSIFT_HOSTNAME") {
            if !hostname.is_empty() {
                agent.hostname = Some(hostname);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logsift.toml");
        fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_load_collector_config() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "/var/lib/logsift/results.sqlite"

[server]
bind = "127.0.0.1:9311"
api_key_env = "LOGSIFT_TEST_COLLECTOR_KEY"
max_payload_bytes = 2048

[[analysis.endpoints]]
url = "https://inference.internal/v1"
model = "haiku"
api_key_env = "LOGSIFT_TEST_INTERNAL_KEY"

[[analysis.endpoints]]
url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
api_key_env = "LOGSIFT_TEST_OPENAI_KEY"
"#,
        );
        std::env::set_var("LOGSIFT_TEST_COLLECTOR_KEY", "shared");
        std::env::set_var("LOGSIFT_TEST_INTERNAL_KEY", "internal-secret");
        std::env::set_var("LOGSIFT_TEST_OPENAI_KEY", "openai-secret");

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:9311");
        assert_eq!(cfg.server.max_payload_bytes, 2048);
        assert_eq!(cfg.server.api_key, "shared");
        assert_eq!(cfg.analysis.endpoints.len(), 2);
        assert_eq!(cfg.analysis.endpoints[0].model, "haiku");
        assert_eq!(cfg.analysis.endpoints[0].api_key, "internal-secret");
        assert_eq!(cfg.analysis.endpoints[1].api_key, "openai-secret");
        assert_eq!(cfg.analysis.timeout_secs, 60);
        assert!(cfg.validate_collector().is_ok());
        assert!(cfg.agent_settings().is_err());
    }

    #[test]
    fn test_defaults_apply_to_empty_file() {
        let (_tmp, path) = write_config("");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.max_payload_bytes, 1 << 20);
        assert_eq!(cfg.analysis.connect_timeout_secs, 5);
        assert!(cfg.analysis.endpoints.is_empty());
    }

    #[test]
    fn test_collector_requires_endpoints() {
        let (_tmp, path) = write_config(
            r#"
[server]
api_key_env = "LOGSIFT_TEST_NO_ENDPOINTS_KEY"
"#,
        );
        std::env::set_var("LOGSIFT_TEST_NO_ENDPOINTS_KEY", "shared");
        let cfg = load_config(&path).unwrap();
        let err = cfg.validate_collector().unwrap_err();
        assert!(err.to_string().contains("endpoints"));
    }

    #[test]
    fn test_collector_requires_secret() {
        let (_tmp, path) = write_config(
            r#"
[server]
api_key_env = "LOGSIFT_TEST_UNSET_KEY_VARIABLE"

[[analysis.endpoints]]
url = "http://localhost:8000/v1"
model = "local"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert!(cfg.validate_collector().is_err());
    }

    #[test]
    fn test_rejects_zero_payload_limit() {
        let (_tmp, path) = write_config(
            r#"
[server]
max_payload_bytes = 0
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        for (key, content) in [
            ("analysis.timeout_secs", "[analysis]\ntimeout_secs = 0\n"),
            ("analysis.connect_timeout_secs", "[analysis]\nconnect_timeout_secs = 0\n"),
        ] {
            let (_tmp, path) = write_config(content);
            let err = load_config(&path).unwrap_err();
            assert!(err.to_string().contains(key), "{}", err);
        }
    }

    #[test]
    fn test_rejects_endpoint_without_model() {
        let (_tmp, path) = write_config(
            r#"
[[analysis.endpoints]]
url = "http://localhost:8000/v1"
model = ""
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("model"));
    }

    #[test]
    fn test_agent_section() {
        let (_tmp, path) = write_config(
            r#"
[agent]
collector_url = "https://collector.internal:9311/ingest"
poll_interval_secs = 60
state_file = "/tmp/logsift-state"
hostname = "web-01"
tls_skip_verify = true
"#,
        );
        let cfg = load_config(&path).unwrap();
        let agent = cfg.agent_settings().unwrap();
        assert_eq!(agent.poll_interval_secs, 60);
        assert!(agent.tls_skip_verify);
        assert_eq!(agent.state_file, PathBuf::from("/tmp/logsift-state"));
    }

    #[test]
    fn test_agent_rejects_zero_interval() {
        let (_tmp, path) = write_config(
            r#"
[agent]
collector_url = "https://collector.internal:9311/ingest"
poll_interval_secs = 0
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert!(cfg.agent_settings().is_err());
    }
}
