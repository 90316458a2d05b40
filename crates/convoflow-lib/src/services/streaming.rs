// Streaming Lifecycle for assistant replies
//
// loading -> streaming -> finalized
//
// - loading: client-only placeholder (clientId, no server id, isLoading)
// - streaming: server id assigned, content accumulates chunk by chunk
// - finalized: transient flags removed, created_at fixed
//
// Transitions return new messages; only chunk appends mutate in place.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::models::{Message, MessageLifecycle, MessageRole};

const CLIENT_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const CLIENT_ID_SUFFIX_LEN: usize = 9;

/// Generate a client-side message id: `msg-<epoch millis>-<random base36>`
pub fn generate_client_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CLIENT_ID_SUFFIX_LEN)
        .map(|_| CLIENT_ID_ALPHABET[rng.gen_range(0..CLIENT_ID_ALPHABET.len())] as char)
        .collect();
    format!("msg-{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// Create the placeholder shown while waiting for the server reply
pub fn create_loading_message() -> Message {
    let client_id = generate_client_id();
    let mut message = Message::new(client_id.clone(), MessageRole::Assistant, "");
    message.client_id = Some(client_id);
    message.is_loading = Some(true);
    message.is_streaming = Some(false);
    message.created_at = Some(Utc::now());
    message
}

/// Create an optimistic user message, reconciled later by clientId
pub fn create_user_message(content: impl Into<String>) -> Message {
    let client_id = generate_client_id();
    let mut message = Message::user(client_id.clone(), content);
    message.client_id = Some(client_id);
    message.created_at = Some(Utc::now());
    message
}

/// Switch a loading placeholder to streaming under the server-assigned id.
/// The original clientId is kept for reconciliation.
pub fn convert_to_streaming_message(loading: &Message, server_id: &str) -> Message {
    let mut message = loading.clone();
    message.client_id = loading.client_id.clone().or_else(|| Some(loading.id.clone()));
    message.id = server_id.to_string();
    message.is_loading = None;
    message.is_streaming = Some(true);
    message
}

/// Append a content chunk. Returns `false` when the message is not
/// streaming; such chunks are protocol violations and must be dropped.
pub fn append_streaming_chunk(message: &mut Message, chunk: &str) -> bool {
    if message.lifecycle() != MessageLifecycle::Streaming {
        log::warn!(
            "[streaming] Dropping chunk for message {} in state {:?}",
            message.id,
            message.lifecycle()
        );
        return false;
    }
    message.content.push_str(chunk);
    true
}

/// Append reasoning text. Accepted until the message is finalized.
pub fn append_thinking_chunk(message: &mut Message, chunk: &str) -> bool {
    if message.lifecycle() == MessageLifecycle::Finalized {
        log::warn!("[streaming] Dropping thinking chunk for finalized message {}", message.id);
        return false;
    }
    message
        .thinking_content
        .get_or_insert_with(String::new)
        .push_str(chunk);
    true
}

/// Finalize a reply: strip transient flags and fix the timestamp to the
/// server-provided one, or now.
pub fn finalize_streaming_message(message: &Message, created_at: Option<DateTime<Utc>>) -> Message {
    let mut finalized = message.clone();
    finalized.is_loading = None;
    finalized.is_streaming = None;
    finalized.created_at = Some(created_at.unwrap_or_else(Utc::now));
    finalized
}
