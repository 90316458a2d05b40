// Channel configuration
// Loaded from `channel.toml` in the app data directory, then overridden by
// CONVOFLOW_* environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::{ChannelError, ConfigError};

/// App data directory name
pub const APP_IDENTIFIER: &str = "com.convoflow.app";

const CONFIG_FILE_NAME: &str = "channel.toml";
const DEFAULT_BASE_URL: &str = "ws://127.0.0.1:8000";
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

pub const ENV_WS_URL: &str = "CONVOFLOW_WS_URL";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "CONVOFLOW_CONNECT_TIMEOUT_MS";

/// Get the app data directory
pub fn get_app_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .map(|p| p.join(APP_IDENTIFIER))
        .ok_or(ConfigError::NoDataDir)
}

/// Default location of the channel config file
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(get_app_data_dir()?.join(CONFIG_FILE_NAME))
}

/// Connection settings for the channel adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// WebSocket base URL, e.g. `ws://127.0.0.1:8000`
    pub base_url: String,
    pub connect_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl ChannelConfig {
    /// Load from the default path (when present) plus environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let path = default_config_path()?;
        let config = if path.exists() {
            Self::from_file(&path)?
        } else {
            log::debug!("[config] No config at {}, using defaults", path.display());
            Self::default()
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Load from an explicit file plus environment overrides
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::from_file(path)?.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from a variable lookup
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = lookup(ENV_WS_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_CONNECT_TIMEOUT_MS) {
            self.connect_timeout_ms = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_CONNECT_TIMEOUT_MS.to_string(),
                value: raw.clone(),
            })?;
        }
        Ok(self)
    }

    /// Channel URL for a session/topic pair: `<base_url>/ws/<session>/<topic>`
    pub fn channel_url(&self, session_id: &str, topic_id: &str) -> Result<Url, ChannelError> {
        let mut url = Url::parse(&self.base_url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ChannelError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        url.path_segments_mut()
            .map_err(|_| ChannelError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["ws", session_id, topic_id]);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "base_url = \"wss://chat.example.com/api\"").unwrap();
        writeln!(file, "connect_timeout_ms = 2500").unwrap();

        let config = ChannelConfig::from_file(file.path()).unwrap();
        assert_eq!(config.base_url, "wss://chat.example.com/api");
        assert_eq!(config.connect_timeout_ms, 2500);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = ChannelConfig::from_toml_str("connect_timeout_ms = 100").unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.connect_timeout_ms, 100);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ChannelConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert_eq!(err.code(), "CONFIG_READ_ERROR");
    }

    #[test]
    fn test_overrides() {
        let config = ChannelConfig::default()
            .with_overrides(lookup(&[
                (ENV_WS_URL, "ws://10.0.0.2:9000"),
                (ENV_CONNECT_TIMEOUT_MS, "750"),
            ]))
            .unwrap();
        assert_eq!(config.base_url, "ws://10.0.0.2:9000");
        assert_eq!(config.connect_timeout_ms, 750);

        let err = ChannelConfig::default()
            .with_overrides(lookup(&[(ENV_CONNECT_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID_VALUE");
    }

    #[test]
    fn test_channel_url() {
        let config = ChannelConfig {
            base_url: "wss://chat.example.com/api/".to_string(),
            connect_timeout_ms: 1000,
        };
        let url = config.channel_url("sess 1", "topic-9").unwrap();
        assert_eq!(url.as_str(), "wss://chat.example.com/api/ws/sess%201/topic-9");

        let url = ChannelConfig::default().channel_url("s", "t").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8000/ws/s/t");
    }

    #[test]
    fn test_channel_url_rejects_http() {
        let config = ChannelConfig {
            base_url: "http://localhost".to_string(),
            connect_timeout_ms: 1000,
        };
        assert!(matches!(
            config.channel_url("s", "t"),
            Err(ChannelError::InvalidUrl(_))
        ));
    }
}
