// Utility modules

pub mod config;
pub mod error;

pub use config::{get_app_data_dir, ChannelConfig};
pub use error::{ChannelError, ChannelErrorCode, ChannelResult, ConfigError};
