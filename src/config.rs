//! Application configuration.
//!
//! Defaults are overridden by environment variables read at startup:
//!
//! | Variable | Default |
//! |---|---|
//! | `COVERS_PORT` | `3000` |
//! | `COVERS_API_BASE` | `https://api.openai.com/v1` |
//! | `OPENAI_API_KEY` | none |
//! | `COVERS_ASSISTANT_ID` | none |
//! | `JINA_API_KEY` | none |
//! | `EXA_API_KEY` | none |
//! | `COVERS_DATA_DIR` | `.covers` |
//! | `COVERS_RETENTION_HOURS` | `12` |

use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::conversation::maintenance::PruneConfig;
use crate::conversation::reducer::DEFAULT_FILE_ROUTE;
use crate::conversation::session::PollPolicy;
use crate::execution::AssistantsConfig;
use crate::execution::assistants::DEFAULT_API_BASE;
use crate::search::SearchConfig;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Longest accepted transcript retention: one year.
pub const MAX_RETENTION_HOURS: i64 = 24 * 365;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
    /// A required setting is absent.
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    /// A setting is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// A URL setting is malformed.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Convenience result alias for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Execution service settings.
    pub execution: ExecutionConfig,
    /// Search providers settings.
    pub search: SearchConfig,
    /// Active-run wait settings.
    pub session: SessionConfig,
    /// Transcript persistence settings.
    pub transcript: TranscriptConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
}

/// Execution service settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// API base URL.
    pub base_url: String,
    /// Bearer key.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Assistant every run is started with.
    pub assistant_id: Option<String>,
    /// Non-streaming request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Longest gap between two stream chunks, in seconds.
    pub stream_read_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            api_key: None,
            assistant_id: None,
            request_timeout_secs: 60,
            stream_read_timeout_secs: 120,
        }
    }
}

impl ExecutionConfig {
    /// Client configuration for [`crate::execution::AssistantsClient`].
    #[must_use]
    pub fn assistants(&self) -> AssistantsConfig {
        let mut config = AssistantsConfig::default()
            .with_base_url(self.base_url.clone())
            .with_stream_read_timeout(Duration::from_secs(self.stream_read_timeout_secs));
        config.request_timeout = Duration::from_secs(self.request_timeout_secs);
        if let Some(key) = &self.api_key {
            config = config.with_api_key(key.clone());
        }
        config
    }

    /// The configured assistant id.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] if it is not set.
    pub fn require_assistant_id(&self) -> ConfigResult<&str> {
        self.assistant_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigError::Missing("COVERS_ASSISTANT_ID"))
    }
}

/// Active-run wait settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum wait in seconds.
    pub max_wait_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_wait_secs: 30,
        }
    }
}

impl SessionConfig {
    /// Poll policy for [`crate::conversation::SessionManager`].
    #[must_use]
    pub const fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_wait: Duration::from_secs(self.max_wait_secs),
        }
    }
}

/// Transcript persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Directory of the file-per-key store.
    pub data_dir: PathBuf,
    /// Retention window in hours.
    pub retention_hours: i64,
    /// Interval between background prunes, in seconds.
    pub prune_interval_secs: u64,
    /// Route prefix for generated files.
    pub file_route: String,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".covers"),
            retention_hours: 12,
            prune_interval_secs: 3600,
            file_route: DEFAULT_FILE_ROUTE.to_string(),
        }
    }
}

impl TranscriptConfig {
    /// Retention window.
    #[must_use]
    pub fn retention(&self) -> TimeDelta {
        TimeDelta::try_hours(self.retention_hours).unwrap_or(TimeDelta::MAX)
    }

    /// Background prune settings.
    #[must_use]
    pub fn prune(&self) -> PruneConfig {
        PruneConfig {
            interval_seconds: self.prune_interval_secs,
            enabled: true,
        }
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

impl AppConfig {
    /// Defaults overridden by the process environment.
    ///
    /// # Errors
    /// Returns an error if a variable is malformed or the result is invalid.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`.
    ///
    /// # Errors
    /// Returns an error if a value is malformed or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(port) = get("COVERS_PORT") {
            config.server.port = parse("COVERS_PORT", &port)?;
        }
        if let Some(base) = get("COVERS_API_BASE") {
            config.execution.base_url = base.trim_end_matches('/').to_string();
        }
        config.execution.api_key = get("OPENAI_API_KEY");
        config.execution.assistant_id = get("COVERS_ASSISTANT_ID");
        config.search.api_keys.keyword = get("JINA_API_KEY");
        config.search.api_keys.semantic = get("EXA_API_KEY");
        if let Some(dir) = get("COVERS_DATA_DIR") {
            config.transcript.data_dir = PathBuf::from(dir);
        }
        if let Some(hours) = get("COVERS_RETENTION_HOURS") {
            config.transcript.retention_hours = parse("COVERS_RETENTION_HOURS", &hours)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        Url::parse(&self.execution.base_url)?;
        Url::parse(&self.search.keyword_base_url)?;
        Url::parse(&self.search.semantic_base_url)?;

        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be > 0".to_string()));
        }

        if self.session.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.poll_interval_ms must be > 0".to_string(),
            ));
        }

        if self.session.max_wait_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.max_wait_secs must be > 0".to_string(),
            ));
        }

        if !(1..=MAX_RETENTION_HOURS).contains(&self.transcript.retention_hours) {
            return Err(ConfigError::Invalid(format!(
                "transcript.retention_hours must be between 1 and {MAX_RETENTION_HOURS}"
            )));
        }

        if self.transcript.prune_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "transcript.prune_interval_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> ConfigResult<T> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.execution.base_url, "https://api.openai.com/v1");
        assert_eq!(config.transcript.retention(), TimeDelta::hours(12));
        assert_eq!(config.transcript.data_dir, PathBuf::from(".covers"));
        assert_eq!(config.session.poll_policy(), PollPolicy::default());
        assert!(config.execution.require_assistant_id().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("COVERS_PORT", "8080"),
            ("COVERS_API_BASE", "http://localhost:9000/v1/"),
            ("OPENAI_API_KEY", "sk-test"),
            ("COVERS_ASSISTANT_ID", "asst_1"),
            ("JINA_API_KEY", "jina"),
            ("EXA_API_KEY", " "),
            ("COVERS_RETENTION_HOURS", "24"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.execution.base_url, "http://localhost:9000/v1");
        assert_eq!(config.execution.require_assistant_id().ok(), Some("asst_1"));
        assert_eq!(config.search.api_keys.keyword.as_deref(), Some("jina"));
        assert_eq!(config.search.api_keys.semantic, None);
        assert_eq!(config.transcript.retention_hours, 24);
        assert_eq!(config.execution.assistants().api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_rejects_malformed_values() {
        let err = AppConfig::from_lookup(lookup(&[("COVERS_PORT", "eighty")]));
        assert!(matches!(err, Err(ConfigError::InvalidValue { key: "COVERS_PORT", .. })));

        let err = AppConfig::from_lookup(lookup(&[("COVERS_RETENTION_HOURS", "0")]));
        assert!(matches!(err, Err(ConfigError::Invalid(_))));

        let err = AppConfig::from_lookup(lookup(&[("COVERS_RETENTION_HOURS", "3000000000")]));
        assert!(matches!(err, Err(ConfigError::Invalid(_))));

        let config = AppConfig::from_lookup(lookup(&[("COVERS_RETENTION_HOURS", "8760")])).unwrap();
        assert_eq!(config.transcript.retention(), TimeDelta::days(365));

        let err = AppConfig::from_lookup(lookup(&[("COVERS_API_BASE", "not a url")]));
        assert!(matches!(err, Err(ConfigError::InvalidUrl(_))));
    }
}
