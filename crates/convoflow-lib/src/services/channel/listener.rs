// Channel listener callbacks

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::models::{ChannelEvent, ConnectionStatus, Message};

/// Callbacks invoked by the channel reader task.
///
/// Called from a background task; implementations must not block.
pub trait ChannelListener: Send + Sync {
    /// Complete `message` event
    fn on_message(&self, message: Message);

    fn on_status(&self, status: ConnectionStatus);

    /// Every other inbound event
    fn on_event(&self, event: ChannelEvent);
}

/// Item forwarded by [`ForwardingListener`]
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelUpdate {
    Message(Message),
    Status(ConnectionStatus),
    Event(ChannelEvent),
}

impl ChannelUpdate {
    /// The update as a channel event, status changes excluded
    pub fn into_event(self) -> Option<ChannelEvent> {
        match self {
            ChannelUpdate::Message(message) => Some(ChannelEvent::Message(Box::new(message))),
            ChannelUpdate::Event(event) => Some(event),
            ChannelUpdate::Status(_) => None,
        }
    }
}

/// Listener that forwards every callback into an mpsc queue, so a single
/// task can own the conversation state.
pub struct ForwardingListener {
    tx: mpsc::UnboundedSender<ChannelUpdate>,
}

impl ForwardingListener {
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<ChannelUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn forward(&self, update: ChannelUpdate) {
        if self.tx.send(update).is_err() {
            log::debug!("[channel] Listener receiver dropped");
        }
    }
}

impl ChannelListener for ForwardingListener {
    fn on_message(&self, message: Message) {
        self.forward(ChannelUpdate::Message(message));
    }

    fn on_status(&self, status: ConnectionStatus) {
        self.forward(ChannelUpdate::Status(status));
    }

    fn on_event(&self, event: ChannelEvent) {
        self.forward(ChannelUpdate::Event(event));
    }
}
