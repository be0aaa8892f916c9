//! Configuration loading and well-known paths.
//!
//! Everything lives under `~/.factcheck/`:
//! - `config.toml`: service and presenter settings (optional)
//! - `daemon.sock`: the daemon's listening socket
//! - `daemon/state.db`: the persisted hand-off state
//! - `logs/`: CLI log files
//!
//! Credentials are never read from the config file. The API key comes from
//! the environment variable named by `service.api_key_env`.

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

pub const CONFIG_ENV: &str = "FACTCHECK_CONFIG";
const FACTCHECK_DIR: &str = ".factcheck";
const CONFIG_FILE: &str = "config.toml";
const SOCKET_NAME: &str = "daemon.sock";

const DEFAULT_ENDPOINT: &str = "https://api.perplexity.ai/chat/completions";
const DEFAULT_MODEL: &str = "sonar";
const DEFAULT_API_KEY_ENV: &str = "FACTCHECK_API_KEY";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct FactcheckConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub presenter: PresenterConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    /// Whole-request timeout; 0 disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl ServiceConfig {
    pub fn api_key(&self) -> Option<String> {
        env::var(&self.api_key_env)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PresenterConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_title_timeout_ms")]
    pub title_timeout_ms: u64,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            title_timeout_ms: default_title_timeout_ms(),
        }
    }
}

impl PresenterConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }

    pub fn title_timeout(&self) -> Duration {
        Duration::from_millis(self.title_timeout_ms.max(100))
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f64 {
    0.2
}

fn default_top_p() -> f64 {
    0.9
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_title_timeout_ms() -> u64 {
    3000
}

/// Returns the factcheck data directory (~/.factcheck).
pub fn factcheck_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(FACTCHECK_DIR))
        .ok_or(CoreError::HomeNotFound)
}

pub fn default_socket_path() -> Result<PathBuf> {
    Ok(factcheck_dir()?.join(SOCKET_NAME))
}

pub fn default_db_path() -> Result<PathBuf> {
    Ok(factcheck_dir()?.join("daemon").join("state.db"))
}

pub fn default_log_dir() -> Result<PathBuf> {
    Ok(factcheck_dir()?.join("logs"))
}

/// Config path, honoring `FACTCHECK_CONFIG`.
pub fn config_path() -> Result<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(factcheck_dir()?.join(CONFIG_FILE))
}

/// Loads the config, returning defaults if the file doesn't exist.
pub fn load_config(path: Option<&Path>) -> Result<FactcheckConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => config_path()?,
    };

    if !config_path.exists() {
        return Ok(FactcheckConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|source| CoreError::Io {
        context: format!("reading {}", config_path.display()),
        source,
    })?;
    toml::from_str::<FactcheckConfig>(&content).map_err(|err| CoreError::ConfigMalformed {
        path: config_path,
        details: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_defaults_when_file_missing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("missing.toml");
        let config = load_config(Some(&path)).expect("load config");
        assert_eq!(config, FactcheckConfig::default());
        assert_eq!(config.service.model, "sonar");
        assert_eq!(config.service.timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn load_config_parses_partial_sections() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(
            &path,
            r#"
[service]
endpoint = "http://127.0.0.1:9/chat/completions"
timeout_secs = 0

[presenter]
poll_interval_ms = 250
"#,
        )
        .expect("write config");

        let config = load_config(Some(&path)).expect("load config");
        assert_eq!(config.service.endpoint, "http://127.0.0.1:9/chat/completions");
        assert_eq!(config.service.timeout(), None);
        assert_eq!(config.service.max_tokens, 1024);
        assert_eq!(config.presenter.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.presenter.title_timeout_ms, 3000);
    }

    #[test]
    fn load_config_reports_malformed_file() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(&path, "[service\nendpoint = 3").expect("write config");

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, CoreError::ConfigMalformed { .. }));
    }

    #[test]
    fn api_key_reads_named_env_var() {
        let config = ServiceConfig {
            api_key_env: "FACTCHECK_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..ServiceConfig::default()
        };
        assert_eq!(config.api_key(), None);
    }
}
