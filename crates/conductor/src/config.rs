//! Bridge configuration
//!
//! Layered at startup: defaults, then an optional TOML file, then environment
//! variables, then CLI flags. Immutable once the server starts.

use hostlink_intent::IntentConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listen host
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Whether `run_shell_command` may run at all
    pub allow_shell_execution: bool,

    /// Hard bound on a single shell command
    pub shell_timeout_secs: u64,

    /// History entries kept per connection
    pub history_depth: usize,

    /// Consecutive turns that receive a failed command as correction context
    pub max_error_feedback_attempts: u32,

    /// Credential for the chat-completions API; absent disables AI fallback
    pub openai_api_key: Option<String>,

    pub llm_model: String,

    pub llm_base_url: String,

    pub llm_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8765,
            allow_shell_execution: false,
            shell_timeout_secs: 30,
            history_depth: 8,
            max_error_feedback_attempts: 1,
            openai_api_key: None,
            llm_model: "o4-mini".to_string(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_timeout_secs: 60,
        }
    }
}

impl BridgeConfig {
    /// Load from a TOML file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        log::info!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides through `lookup` (usually `std::env::var`)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("BRIDGE_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("BRIDGE_PORT") {
            self.port = parse_number("BRIDGE_PORT", &port)?;
        }
        if let Some(flag) = lookup("ALLOW_SHELL_EXECUTION") {
            self.allow_shell_execution = flag.trim().eq_ignore_ascii_case("true");
        }
        if let Some(secs) = lookup("SHELL_COMMAND_TIMEOUT") {
            self.shell_timeout_secs = parse_number("SHELL_COMMAND_TIMEOUT", &secs)?;
        }
        if let Some(depth) = lookup("HISTORY_MAX_LEN") {
            self.history_depth = parse_number("HISTORY_MAX_LEN", &depth)?;
        }
        if let Some(attempts) = lookup("MAX_ERROR_FEEDBACK_ATTEMPTS") {
            self.max_error_feedback_attempts = parse_number("MAX_ERROR_FEEDBACK_ATTEMPTS", &attempts)?;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            let key = key.trim().to_string();
            self.openai_api_key = (!key.is_empty()).then_some(key);
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.llm_model = model;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm_base_url = url;
        }
        if let Some(secs) = lookup("OPENAI_TIMEOUT") {
            self.llm_timeout_secs = parse_number("OPENAI_TIMEOUT", &secs)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("history_depth", self.history_depth as u64),
            ("shell_timeout_secs", self.shell_timeout_secs),
            ("llm_timeout_secs", self.llm_timeout_secs),
        ];

        for (key, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: "0".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shell_timeout(&self) -> Duration {
        Duration::from_secs(self.shell_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    /// Interpretation-side view of this configuration
    pub fn intent_config(&self) -> IntentConfig {
        IntentConfig {
            allow_shell_execution: self.allow_shell_execution,
            history_depth: self.history_depth,
            max_error_feedback_attempts: self.max_error_feedback_attempts,
        }
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
