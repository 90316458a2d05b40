// Channel and configuration error types
// The assembly layer is total; only the I/O boundary can fail.

use thiserror::Error;

/// Channel adapter error
#[derive(Error, Debug)]
pub enum ChannelError {
    /// No connection is open
    #[error("Channel is not connected")]
    NotConnected,

    /// Channel URL could not be built
    #[error("Invalid channel URL: {0}")]
    InvalidUrl(String),

    /// WebSocket handshake failed
    #[error("Cannot connect to channel: {0}")]
    ConnectionFailed(String),

    /// Handshake did not finish in time
    #[error("Channel connection timed out after {0} ms")]
    Timeout(u64),

    /// Outbound frame could not be queued
    #[error("Failed to send frame: {0}")]
    SendFailed(String),

    /// Frame could not be encoded
    #[error("Frame encode error: {0}")]
    EncodeError(String),
}

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        ChannelError::EncodeError(err.to_string())
    }
}

impl From<url::ParseError> for ChannelError {
    fn from(err: url::ParseError) -> Self {
        ChannelError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ChannelError::ConnectionFailed(err.to_string())
    }
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Stable channel error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelErrorCode {
    NotConnected,
    InvalidUrl,
    ConnectionFailed,
    Timeout,
    SendFailed,
    EncodeError,
}

impl ChannelErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelErrorCode::NotConnected => "CHANNEL_NOT_CONNECTED",
            ChannelErrorCode::InvalidUrl => "CHANNEL_INVALID_URL",
            ChannelErrorCode::ConnectionFailed => "CHANNEL_CONNECTION_FAILED",
            ChannelErrorCode::Timeout => "CHANNEL_TIMEOUT",
            ChannelErrorCode::SendFailed => "CHANNEL_SEND_FAILED",
            ChannelErrorCode::EncodeError => "CHANNEL_ENCODE_ERROR",
        }
    }
}

impl ChannelError {
    pub fn code(&self) -> ChannelErrorCode {
        match self {
            ChannelError::NotConnected => ChannelErrorCode::NotConnected,
            ChannelError::InvalidUrl(_) => ChannelErrorCode::InvalidUrl,
            ChannelError::ConnectionFailed(_) => ChannelErrorCode::ConnectionFailed,
            ChannelError::Timeout(_) => ChannelErrorCode::Timeout,
            ChannelError::SendFailed(_) => ChannelErrorCode::SendFailed,
            ChannelError::EncodeError(_) => ChannelErrorCode::EncodeError,
        }
    }
}

impl From<ChannelError> for String {
    fn from(err: ChannelError) -> Self {
        err.to_string()
    }
}

/// Configuration error
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine application data directory")]
    NoDataDir,

    #[error("Failed to read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("Invalid config: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::NoDataDir => "CONFIG_NO_DATA_DIR",
            ConfigError::Read { .. } => "CONFIG_READ_ERROR",
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR",
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_error_codes() {
        assert_eq!(ChannelError::NotConnected.code().as_str(), "CHANNEL_NOT_CONNECTED");
        assert_eq!(ChannelError::Timeout(500).code(), ChannelErrorCode::Timeout);
        assert_eq!(
            ChannelError::Timeout(500).to_string(),
            "Channel connection timed out after 500 ms"
        );
    }

    #[test]
    fn test_url_error_conversion() {
        let err: ChannelError = url::Url::parse("not a url").unwrap_err().into();
        assert_eq!(err.code(), ChannelErrorCode::InvalidUrl);
        let message: String = err.into();
        assert!(message.starts_with("Invalid channel URL"));
    }

    #[test]
    fn test_config_error_codes() {
        let err: ConfigError = toml::from_str::<toml::Value>("= broken").unwrap_err().into();
        assert_eq!(err.code(), "CONFIG_PARSE_ERROR");
    }
}
