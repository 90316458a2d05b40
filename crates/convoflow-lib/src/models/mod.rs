// Data models module
// Conversation messages, execution timelines and channel events

pub mod events;
pub mod execution;
pub mod message;

pub use events::*;
pub use execution::*;
pub use message::*;
