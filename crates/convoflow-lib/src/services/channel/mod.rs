// Channel Adapter
// Turns the real-time WebSocket channel into typed ChannelEvents and sends
// user text and tool-call control frames back.

pub mod listener;
pub mod manager;

pub use listener::{ChannelListener, ChannelUpdate, ForwardingListener};
pub use manager::{decode_frame, ChannelManager, ChannelTarget};
