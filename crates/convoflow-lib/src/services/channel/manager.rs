// Channel Manager
// Holds at most one WebSocket connection (session + topic) at a time.
//
// - connect: tears down the previous connection, then opens the new one
// - reader task: frames -> ChannelEvent -> listener callbacks
// - writer task: drains the outbound queue into the socket
// - control frames are fire-and-forget; results arrive as ordinary events

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::listener::ChannelListener;
use crate::models::{ChannelEvent, ConnectionStatus, OutboundControl};
use crate::utils::config::ChannelConfig;
use crate::utils::error::{ChannelError, ChannelResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Session/topic pair a connection is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    pub session_id: String,
    pub topic_id: String,
}

struct ActiveConnection {
    generation: u64,
    target: ChannelTarget,
    outbound: mpsc::UnboundedSender<WsMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    listener: Arc<dyn ChannelListener>,
}

impl ActiveConnection {
    /// Stop reading, then let the writer flush a close frame and exit
    fn shutdown(self) {
        self.reader.abort();
        let _ = self.outbound.send(WsMessage::Close(None));
    }
}

/// Connection manager for the conversation channel.
///
/// Clones share the same connection.
#[derive(Clone)]
pub struct ChannelManager {
    config: ChannelConfig,
    active: Arc<RwLock<Option<ActiveConnection>>>,
    generation: Arc<AtomicU64>,
}

impl ChannelManager {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            active: Arc::new(RwLock::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Connect to `session_id`/`topic_id`, replacing any current connection.
    ///
    /// Failures are reported through `on_status` and the returned status,
    /// never as an error.
    pub async fn connect(
        &self,
        session_id: &str,
        topic_id: &str,
        listener: Arc<dyn ChannelListener>,
    ) -> ConnectionStatus {
        // Held until the new connection is stored, so a fast-closing reader
        // cannot observe a half-registered connection.
        let mut active = self.active.write().await;

        if let Some(previous) = active.take() {
            log::info!(
                "[channel] Closing {}/{} before reconnecting",
                previous.target.session_id,
                previous.target.topic_id
            );
            let previous_listener = previous.listener.clone();
            previous.shutdown();
            previous_listener.on_status(ConnectionStatus::disconnected());
        }

        let ws = match self.open(session_id, topic_id).await {
            Ok(ws) => ws,
            Err(e) => {
                log::warn!("[channel] Connect to {}/{} failed: {}", session_id, topic_id, e);
                let status = ConnectionStatus::failed(e.to_string());
                listener.on_status(status.clone());
                return status;
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (sink, stream) = ws.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let status = ConnectionStatus::connected();
        listener.on_status(status.clone());

        let writer = tokio::spawn(write_loop(sink, outbound_rx));
        let reader = tokio::spawn(read_loop(
            stream,
            listener.clone(),
            self.active.clone(),
            generation,
        ));

        *active = Some(ActiveConnection {
            generation,
            target: ChannelTarget {
                session_id: session_id.to_string(),
                topic_id: topic_id.to_string(),
            },
            outbound,
            reader,
            writer,
            listener,
        });
        log::info!("[channel] Connected to {}/{}", session_id, topic_id);
        status
    }

    async fn open(&self, session_id: &str, topic_id: &str) -> ChannelResult<WsStream> {
        let url = self.config.channel_url(session_id, topic_id)?;
        let timeout_ms = self.config.connect_timeout_ms;

        let handshake = connect_async(url.as_str());
        match tokio::time::timeout(Duration::from_millis(timeout_ms), handshake).await {
            Ok(Ok((ws, _response))) => Ok(ws),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ChannelError::Timeout(timeout_ms)),
        }
    }

    /// Close the current connection, if any
    pub async fn disconnect(&self) {
        let previous = self.active.write().await.take();
        if let Some(connection) = previous {
            log::info!(
                "[channel] Disconnecting {}/{}",
                connection.target.session_id,
                connection.target.topic_id
            );
            let listener = connection.listener.clone();
            connection.shutdown();
            listener.on_status(ConnectionStatus::disconnected());
        }
    }

    /// Send a user message as a plain text frame
    pub async fn send_message(&self, text: &str) -> ChannelResult<()> {
        self.send_frame(WsMessage::Text(text.to_string())).await
    }

    pub async fn confirm_tool_call(&self, tool_call_id: &str) -> ChannelResult<()> {
        self.send_control(OutboundControl::ToolCallConfirm {
            tool_call_id: tool_call_id.to_string(),
        })
        .await
    }

    /// Request cancellation; acknowledgment is not tracked
    pub async fn cancel_tool_call(&self, tool_call_id: &str) -> ChannelResult<()> {
        self.send_control(OutboundControl::ToolCallCancel {
            tool_call_id: tool_call_id.to_string(),
        })
        .await
    }

    pub async fn current_target(&self) -> Option<ChannelTarget> {
        self.active.read().await.as_ref().map(|c| c.target.clone())
    }

    pub async fn is_connected(&self) -> bool {
        self.active
            .read()
            .await
            .as_ref()
            .is_some_and(|c| !c.writer.is_finished())
    }

    async fn send_control(&self, control: OutboundControl) -> ChannelResult<()> {
        let frame = serde_json::to_string(&control)?;
        self.send_frame(WsMessage::Text(frame)).await
    }

    async fn send_frame(&self, frame: WsMessage) -> ChannelResult<()> {
        let active = self.active.read().await;
        let connection = active.as_ref().ok_or(ChannelError::NotConnected)?;
        connection
            .outbound
            .send(frame)
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, WsMessage>,
    mut outbound: mpsc::UnboundedReceiver<WsMessage>,
) {
    while let Some(frame) = outbound.recv().await {
        let closing = matches!(frame, WsMessage::Close(_));
        if let Err(e) = sink.send(frame).await {
            log::debug!("[channel] Write failed: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    listener: Arc<dyn ChannelListener>,
    active: Arc<RwLock<Option<ActiveConnection>>>,
    generation: u64,
) {
    let mut error: Option<String> = None;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => dispatch_frame(listener.as_ref(), &text),
            Ok(WsMessage::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => dispatch_frame(listener.as_ref(), text),
                Err(_) => log::debug!("[channel] Skipping non-UTF-8 binary frame"),
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                log::warn!("[channel] Read failed: {}", e);
                error = Some(e.to_string());
                break;
            }
        }
    }

    // Only report when this connection is still the active one; a manual
    // disconnect or reconnect has already reported its own status.
    let closed = {
        let mut guard = active.write().await;
        let is_current = guard.as_ref().is_some_and(|c| c.generation == generation);
        if is_current {
            guard.take()
        } else {
            None
        }
    };
    if let Some(connection) = closed {
        let _ = connection.outbound.send(WsMessage::Close(None));
        log::info!(
            "[channel] Connection to {}/{} closed by server",
            connection.target.session_id,
            connection.target.topic_id
        );
        listener.on_status(match error {
            Some(e) => ConnectionStatus::failed(e),
            None => ConnectionStatus::disconnected(),
        });
    }
}

/// Decode one inbound text frame; undecodable frames are logged and skipped
pub fn decode_frame(text: &str) -> Option<ChannelEvent> {
    match serde_json::from_str::<ChannelEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            log::warn!("[channel] Skipping undecodable frame: {}", e);
            None
        }
    }
}

fn dispatch_frame(listener: &dyn ChannelListener, text: &str) {
    match decode_frame(text) {
        Some(ChannelEvent::Message(message)) => listener.on_message(*message),
        Some(event) => listener.on_event(event),
        None => {}
    }
}
