// Tool-Call Correlator
// Maps a tool-call id to the ToolCall record living inside an output message
// list, so responses can be merged into the request they answer.
//
// The correlator only ever mutates records inside the output vector it is
// handed; messages supplied by the caller are cloned before they get there.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::parser::ToolEventDescriptor;
use crate::models::{Message, ToolCall, ToolCallStatus};

/// Tool name used for responses whose request was never seen
pub const DEFAULT_TOOL_NAME: &str = "unknown_tool";

/// Prefix of synthetic assistant message ids
pub const SYNTHETIC_MESSAGE_PREFIX: &str = "tool-";

/// Timestamp of a synthesized call when neither the payload nor the
/// message carries one; keeps replays identical
pub const UNKNOWN_TIMESTAMP: i64 = 0;

/// Position of a ToolCall inside the output message list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ToolCallSlot {
    message: usize,
    call: usize,
}

/// Lookup from tool-call id to its owning message and position
#[derive(Debug, Default)]
pub struct ToolCallCorrelator {
    slots: HashMap<String, ToolCallSlot>,
}

impl ToolCallCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every tool call already present in `messages`
    pub fn index(messages: &[Message]) -> Self {
        let mut correlator = Self::new();
        for position in 0..messages.len() {
            correlator.register_message(messages, position);
        }
        correlator
    }

    /// Register the tool calls carried by `messages[position]`
    pub fn register_message(&mut self, messages: &[Message], position: usize) {
        let Some(calls) = messages.get(position).and_then(|m| m.tool_calls.as_ref()) else {
            return;
        };
        for (call, tool_call) in calls.iter().enumerate() {
            self.slots.insert(
                tool_call.id.clone(),
                ToolCallSlot {
                    message: position,
                    call,
                },
            );
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the message owning tool call `id`
    pub fn owner(&self, id: &str) -> Option<usize> {
        self.slots.get(id).map(|slot| slot.message)
    }

    pub fn get<'a>(&self, messages: &'a [Message], id: &str) -> Option<&'a ToolCall> {
        let slot = self.slots.get(id)?;
        messages
            .get(slot.message)?
            .tool_calls
            .as_ref()?
            .get(slot.call)
            .filter(|call| call.id == id)
    }

    fn get_mut<'a>(&self, messages: &'a mut [Message], id: &str) -> Option<&'a mut ToolCall> {
        let slot = self.slots.get(id)?;
        messages
            .get_mut(slot.message)?
            .tool_calls
            .as_mut()?
            .get_mut(slot.call)
            .filter(|call| call.id == id)
    }

    /// Append `tool_call` to the message at `position` and register it.
    /// A call whose id is already known is merged instead of duplicated.
    pub fn attach(
        &mut self,
        messages: &mut [Message],
        position: usize,
        tool_call: ToolCall,
    ) -> bool {
        if let Some(existing) = self.get_mut(messages, &tool_call.id) {
            existing.name = tool_call.name;
            existing.status = tool_call.status;
            if tool_call.description.is_some() {
                existing.description = tool_call.description;
            }
            if !tool_call.arguments.is_empty() {
                existing.arguments = tool_call.arguments;
            }
            return true;
        }

        let Some(message) = messages.get_mut(position) else {
            return false;
        };
        let calls = message.tool_calls.get_or_insert_with(Vec::new);
        let id = tool_call.id.clone();
        calls.push(tool_call);
        self.slots.insert(
            id,
            ToolCallSlot {
                message: position,
                call: calls.len() - 1,
            },
        );
        true
    }

    /// Fold a tool-call request into the output.
    ///
    /// A new request becomes a synthetic assistant message holding a single
    /// call; a request for an id that is already known updates that call.
    /// Returns the index of the owning message.
    pub fn apply_request(
        &mut self,
        messages: &mut Vec<Message>,
        descriptor: &ToolEventDescriptor,
        fallback_id: Option<&str>,
        created_at: Option<DateTime<Utc>>,
    ) -> Option<usize> {
        let key = descriptor.correlation_key(fallback_id)?;

        if let Some(existing) = self.get_mut(messages, &key) {
            merge_request(existing, descriptor);
            return self.owner(&key);
        }

        let mut tool_call =
            new_tool_call(&key, descriptor, ToolCallStatus::WaitingConfirmation, created_at);
        merge_request(&mut tool_call, descriptor);
        Some(self.push_synthetic(messages, &key, tool_call, created_at))
    }

    /// Fold a live tool-call request into the message at `position`
    /// (the reply being streamed) instead of a synthetic message.
    pub fn apply_request_at(
        &mut self,
        messages: &mut [Message],
        position: usize,
        descriptor: &ToolEventDescriptor,
        created_at: Option<DateTime<Utc>>,
    ) -> Option<usize> {
        let key = descriptor.correlation_key(None)?;

        if let Some(existing) = self.get_mut(messages, &key) {
            merge_request(existing, descriptor);
            return self.owner(&key);
        }

        let mut tool_call =
            new_tool_call(&key, descriptor, ToolCallStatus::WaitingConfirmation, created_at);
        merge_request(&mut tool_call, descriptor);
        self.attach(messages, position, tool_call).then_some(position)
    }

    /// Merge a tool-call response or status update into the output.
    ///
    /// Responses for unseen ids get a placeholder assistant message first.
    /// Returns `None` when the response has no usable correlation key.
    pub fn apply_response(
        &mut self,
        messages: &mut Vec<Message>,
        descriptor: &ToolEventDescriptor,
        fallback_id: Option<&str>,
        created_at: Option<DateTime<Utc>>,
    ) -> Option<usize> {
        let Some(key) = descriptor.correlation_key(fallback_id) else {
            log::debug!("[correlator] Dropping tool response without a correlation key");
            return None;
        };

        if self.get(messages, &key).is_none() {
            log::debug!("[correlator] No request seen for {}, synthesizing placeholder", key);
            let placeholder =
                new_tool_call(&key, descriptor, ToolCallStatus::Completed, created_at);
            self.push_synthetic(messages, &key, placeholder, created_at);
        }

        let tool_call = self.get_mut(messages, &key)?;
        merge_response(tool_call, descriptor);
        self.owner(&key)
    }

    fn push_synthetic(
        &mut self,
        messages: &mut Vec<Message>,
        key: &str,
        tool_call: ToolCall,
        created_at: Option<DateTime<Utc>>,
    ) -> usize {
        let mut message = Message::assistant(format!("{}{}", SYNTHETIC_MESSAGE_PREFIX, key), "");
        message.created_at = created_at;
        message.tool_calls = Some(vec![tool_call]);
        messages.push(message);

        let position = messages.len() - 1;
        self.register_message(messages, position);
        position
    }
}

fn new_tool_call(
    key: &str,
    descriptor: &ToolEventDescriptor,
    default_status: ToolCallStatus,
    created_at: Option<DateTime<Utc>>,
) -> ToolCall {
    let mut tool_call = ToolCall::new(
        key,
        descriptor.name.as_deref().unwrap_or(DEFAULT_TOOL_NAME),
        descriptor.parsed_status().unwrap_or(default_status),
    );
    tool_call.timestamp = descriptor
        .timestamp
        .or_else(|| created_at.map(|at| at.timestamp_millis()))
        .unwrap_or(UNKNOWN_TIMESTAMP);
    tool_call
}

fn merge_request(tool_call: &mut ToolCall, descriptor: &ToolEventDescriptor) {
    if let Some(name) = &descriptor.name {
        tool_call.name = name.clone();
    }
    if let Some(description) = &descriptor.description {
        tool_call.description = Some(description.clone());
    }
    if let Some(arguments) = &descriptor.arguments {
        tool_call.arguments = arguments.clone();
    }
    if let Some(status) = descriptor.parsed_status() {
        tool_call.status = status;
    }
}

fn merge_response(tool_call: &mut ToolCall, descriptor: &ToolEventDescriptor) {
    if let Some(status) = descriptor.parsed_status() {
        tool_call.status = status;
    }
    if let Some(result) = descriptor.result_text() {
        tool_call.result = Some(result);
    }
    if let Some(error) = descriptor.error_text() {
        tool_call.error = Some(error);
        tool_call.status = ToolCallStatus::Failed;
    }
}
