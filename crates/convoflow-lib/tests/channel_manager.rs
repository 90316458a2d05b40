// ChannelManager against an in-process WebSocket server

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use convoflow_lib::models::{ChannelEvent, MessageLifecycle, ToolCallStatus};
use convoflow_lib::services::channel::{ChannelManager, ChannelUpdate, ForwardingListener};
use convoflow_lib::services::ConversationSession;
use convoflow_lib::utils::ChannelConfig;

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    /// Text frames received from clients
    received: mpsc::UnboundedReceiver<String>,
    /// Request path of every accepted handshake
    paths: mpsc::UnboundedReceiver<String>,
}

impl TestServer {
    fn config(&self) -> ChannelConfig {
        ChannelConfig {
            base_url: format!("ws://{}", self.addr),
            connect_timeout_ms: 2_000,
        }
    }
}

/// Accepts connections, sends `script` to each, then echoes received text
/// frames to the test. With `close_after_script` the server hangs up instead.
async fn spawn_server(script: Vec<String>, close_after_script: bool) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (received_tx, received) = mpsc::unbounded_channel();
    let (paths_tx, paths) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let script = script.clone();
            let received_tx = received_tx.clone();
            let paths_tx = paths_tx.clone();

            tokio::spawn(async move {
                let callback =
                    |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                        let _ = paths_tx.send(request.uri().path().to_string());
                        Ok(response)
                    };
                let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
                    return;
                };

                for frame in script {
                    if ws.send(WsMessage::Text(frame)).await.is_err() {
                        return;
                    }
                }
                if close_after_script {
                    let _ = ws.close(None).await;
                    return;
                }

                while let Some(Ok(frame)) = ws.next().await {
                    match frame {
                        WsMessage::Text(text) => {
                            let _ = received_tx.send(text);
                        }
                        WsMessage::Close(_) => break,
                        _ => {}
                    }
                }
            });
        }
    });

    TestServer {
        addr,
        received,
        paths,
    }
}

fn frame(value: serde_json::Value) -> String {
    value.to_string()
}

async fn next_update(rx: &mut mpsc::UnboundedReceiver<ChannelUpdate>) -> ChannelUpdate {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a channel update")
        .expect("listener channel closed")
}

async fn next_frame(server: &mut TestServer) -> serde_json::Value {
    let text = timeout(WAIT, server.received.recv()).await.unwrap().unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_stream_into_session_and_send_frames() {
    let script = vec![
        frame(json!({ "type": "loading" })),
        frame(json!({ "type": "streaming_start", "data": { "id": "srv-1" } })),
        frame(json!({ "type": "streaming_chunk", "data": { "id": "srv-1", "content": "Hello " } })),
        "not a channel frame".to_string(),
        frame(json!({ "type": "tool_call", "data": { "id": "c1", "name": "web_search" } })),
        frame(json!({ "type": "streaming_chunk", "data": { "id": "srv-1", "content": "world" } })),
        frame(json!({ "type": "streaming_end", "data": { "id": "srv-1" } })),
        frame(json!({
            "type": "message",
            "data": { "id": "u-echo", "role": "user", "content": "echo" }
        })),
    ];
    let mut server = spawn_server(script, false).await;
    let manager = ChannelManager::new(server.config());
    let (listener, mut updates) = ForwardingListener::channel();

    let status = manager.connect("sess-1", "topic-1", listener).await;
    assert!(status.connected, "connect failed: {:?}", status.error);
    assert!(manager.is_connected().await);
    let target = manager.current_target().await.unwrap();
    assert_eq!(target.session_id, "sess-1");
    assert_eq!(target.topic_id, "topic-1");
    assert_eq!(
        timeout(WAIT, server.paths.recv()).await.unwrap().as_deref(),
        Some("/ws/sess-1/topic-1")
    );

    match next_update(&mut updates).await {
        ChannelUpdate::Status(status) => assert!(status.connected),
        other => panic!("expected connected status, got {:?}", other),
    }

    let mut session = ConversationSession::new();
    let reply = loop {
        let update = next_update(&mut updates).await;
        assert!(
            !matches!(update, ChannelUpdate::Message(_)),
            "message arrived before streaming_end"
        );
        if let Some(reply) = update.into_event().and_then(|event| session.apply(event)) {
            break reply;
        }
    };
    assert_eq!(reply.id, "srv-1");
    assert_eq!(reply.content, "Hello world");
    assert_eq!(reply.lifecycle(), MessageLifecycle::Finalized);
    let call = &reply.tool_calls.as_ref().unwrap()[0];
    assert_eq!(call.id, "c1");
    assert_eq!(call.status, ToolCallStatus::WaitingConfirmation);

    // `message` events use the dedicated callback
    match next_update(&mut updates).await {
        ChannelUpdate::Message(message) => assert_eq!(message.id, "u-echo"),
        other => panic!("expected message update, got {:?}", other),
    }

    manager.send_message("hi there").await.unwrap();
    manager.confirm_tool_call("c1").await.unwrap();
    manager.cancel_tool_call("c2").await.unwrap();

    let sent = timeout(WAIT, server.received.recv()).await.unwrap().unwrap();
    assert_eq!(sent, "hi there");
    let confirm = next_frame(&mut server).await;
    assert_eq!(confirm, json!({ "type": "tool_call_confirm", "tool_call_id": "c1" }));
    let cancel = next_frame(&mut server).await;
    assert_eq!(cancel, json!({ "type": "tool_call_cancel", "tool_call_id": "c2" }));

    manager.disconnect().await;
    match next_update(&mut updates).await {
        ChannelUpdate::Status(status) => {
            assert!(!status.connected);
            assert!(status.error.is_none());
        }
        other => panic!("expected disconnected status, got {:?}", other),
    }
    assert!(!manager.is_connected().await);
    assert!(manager.current_target().await.is_none());
}

#[tokio::test]
async fn test_reconnect_tears_down_previous_connection() {
    let mut server = spawn_server(Vec::new(), false).await;
    let manager = ChannelManager::new(server.config());

    let (first, mut first_updates) = ForwardingListener::channel();
    assert!(manager.connect("sess-1", "topic-a", first).await.connected);
    assert!(matches!(
        next_update(&mut first_updates).await,
        ChannelUpdate::Status(status) if status.connected
    ));

    let (second, mut second_updates) = ForwardingListener::channel();
    assert!(manager.connect("sess-1", "topic-b", second).await.connected);

    assert!(matches!(
        next_update(&mut first_updates).await,
        ChannelUpdate::Status(status) if !status.connected
    ));
    assert!(matches!(
        next_update(&mut second_updates).await,
        ChannelUpdate::Status(status) if status.connected
    ));
    assert_eq!(manager.current_target().await.unwrap().topic_id, "topic-b");

    assert_eq!(
        timeout(WAIT, server.paths.recv()).await.unwrap().as_deref(),
        Some("/ws/sess-1/topic-a")
    );
    assert_eq!(
        timeout(WAIT, server.paths.recv()).await.unwrap().as_deref(),
        Some("/ws/sess-1/topic-b")
    );

    // Clones share the connection
    let clone = manager.clone();
    clone.send_message("via clone").await.unwrap();
    assert_eq!(
        timeout(WAIT, server.received.recv()).await.unwrap().as_deref(),
        Some("via clone")
    );

    manager.disconnect().await;
}

#[tokio::test]
async fn test_server_close_reports_disconnect() {
    let script = vec![frame(json!({ "type": "processing" }))];
    let server = spawn_server(script, true).await;
    let manager = ChannelManager::new(server.config());
    let (listener, mut updates) = ForwardingListener::channel();

    assert!(manager.connect("s", "t", listener).await.connected);
    assert!(matches!(
        next_update(&mut updates).await,
        ChannelUpdate::Status(status) if status.connected
    ));
    assert_eq!(
        next_update(&mut updates).await,
        ChannelUpdate::Event(ChannelEvent::Processing)
    );
    assert!(matches!(
        next_update(&mut updates).await,
        ChannelUpdate::Status(status) if !status.connected
    ));
    assert!(!manager.is_connected().await);
    assert!(manager.send_message("late").await.is_err());
}

#[tokio::test]
async fn test_refused_connection_reports_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager = ChannelManager::new(ChannelConfig {
        base_url: format!("ws://{}", addr),
        connect_timeout_ms: 2_000,
    });
    let (listener, mut updates) = ForwardingListener::channel();

    let status = manager.connect("s", "t", listener).await;
    assert!(!status.connected);
    assert!(status.error.is_some());
    assert_eq!(next_update(&mut updates).await, ChannelUpdate::Status(status));
    assert!(!manager.is_connected().await);
}
