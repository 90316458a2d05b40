// ConvoFlow Library
// Assembles real-time multi-agent conversation events into a stable,
// replayable message history with correlated tool calls and execution
// timelines.
//
// - models: messages, execution timelines, channel events
// - services: assembler, streaming lifecycle, timeline, session, channel
// - utils: configuration and error types

pub mod models;
pub mod services;
pub mod utils;

pub use models::*;
pub use services::assembler::{assemble_history, group_tool_messages_with_assistant};
pub use services::channel::{ChannelListener, ChannelManager};
pub use services::ConversationSession;
pub use utils::{ChannelConfig, ChannelError, ConfigError};
