// Services module
// Event assembly pipeline plus the channel boundary

pub mod assembler;
pub mod channel;
pub mod session;
pub mod streaming;
pub mod timeline;

pub use session::ConversationSession;
