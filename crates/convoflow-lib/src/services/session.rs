// Conversation Session
// Owns the state of one conversation and folds channel events into it:
// ordered messages, the tool-call index, the in-flight reply and the live
// execution timeline.

use chrono::Utc;
use serde_json::Value;

use crate::models::{
    AgentExecutionState, ChannelEvent, Message, MessageLifecycle, MessageRole, StreamEnd,
    ToolCall,
};
use crate::services::assembler::{
    assemble_history, parse_tool_payload, ToolCallCorrelator, ToolEventDescriptor, ToolPayload,
};
use crate::services::streaming::{
    append_streaming_chunk, append_thinking_chunk, convert_to_streaming_message,
    create_loading_message, create_user_message, finalize_streaming_message, generate_client_id,
};
use crate::services::timeline::ExecutionTimelineBuilder;

/// State of one conversation, driven by channel events
#[derive(Debug, Default)]
pub struct ConversationSession {
    messages: Vec<Message>,
    correlator: ToolCallCorrelator,
    /// Id (client or server) of the reply currently being produced
    in_flight: Option<String>,
    timeline: Option<ExecutionTimelineBuilder>,
    is_processing: bool,
    last_state: Option<Value>,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the session contents with a stored history
    pub fn load_history(&mut self, history: Vec<Message>) {
        self.messages = assemble_history(&history);
        self.correlator = ToolCallCorrelator::index(&self.messages);
        self.in_flight = None;
        self.timeline = None;
        self.is_processing = false;
        log::info!("[session] Loaded {} messages", self.messages.len());
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    /// Reply currently loading or streaming
    pub fn in_flight(&self) -> Option<&Message> {
        self.in_flight_index().map(|index| &self.messages[index])
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCall> {
        self.correlator.get(&self.messages, id)
    }

    /// Timeline of the agent run in progress
    pub fn live_execution(&self) -> Option<&AgentExecutionState> {
        self.timeline.as_ref().map(ExecutionTimelineBuilder::state)
    }

    /// Payload of the most recent `state_update` event
    pub fn last_state(&self) -> Option<&Value> {
        self.last_state.as_ref()
    }

    /// Append an optimistic user message. The server echo later replaces it,
    /// matched by client id or else by content.
    pub fn push_user_message(&mut self, content: impl Into<String>) -> Message {
        let message = create_user_message(content);
        self.messages.push(message.clone());
        message
    }

    /// Fold one channel event into the session.
    ///
    /// Returns the reply finalized by this event, if any.
    pub fn apply(&mut self, event: ChannelEvent) -> Option<Message> {
        log::trace!("[session] Applying {}", event.kind());

        match event {
            ChannelEvent::Processing | ChannelEvent::Loading => {
                self.is_processing = true;
                self.placeholder_index();
            }
            ChannelEvent::StreamingStart(data) => self.start_streaming(&data.id),
            ChannelEvent::StreamingChunk(data) => match self.position_of(&data.id) {
                Some(index) => {
                    append_streaming_chunk(&mut self.messages[index], &data.content);
                }
                None => log::debug!("[session] Dropping chunk for unknown message {}", data.id),
            },
            ChannelEvent::StreamingEnd(data) => return self.finish_streaming(data),
            ChannelEvent::ThinkingStart(data) => {
                if self.reply_index(&data.id).is_none() {
                    self.placeholder_index();
                }
            }
            ChannelEvent::ThinkingChunk(data) => match self.reply_index(&data.id) {
                Some(index) => {
                    append_thinking_chunk(&mut self.messages[index], &data.content);
                }
                None => log::debug!("[session] Dropping thinking chunk for {}", data.id),
            },
            ChannelEvent::ThinkingEnd(data) => {
                log::debug!("[session] Thinking finished for {}", data.id);
            }
            ChannelEvent::Message(message) => self.upsert_message(*message),
            ChannelEvent::SearchCitations(payload) => {
                match self.attachment_target(payload.message_id.as_deref()) {
                    Some(index) => self.messages[index]
                        .citations
                        .get_or_insert_with(Vec::new)
                        .extend(payload.citations),
                    None => log::debug!("[session] No message for search citations"),
                }
            }
            ChannelEvent::GeneratedFiles(payload) => {
                match self.attachment_target(payload.message_id.as_deref()) {
                    Some(index) => self.messages[index]
                        .attachments
                        .get_or_insert_with(Vec::new)
                        .extend(payload.files),
                    None => log::debug!("[session] No message for generated files"),
                }
            }
            ChannelEvent::ToolCall(payload) => self.apply_tool_event(payload, true),
            ChannelEvent::ToolResult(payload) => self.apply_tool_event(payload, false),
            ChannelEvent::AgentStart(data) => {
                let mut builder = ExecutionTimelineBuilder::start(&data);
                if builder.message_id().is_none() {
                    let index = self.placeholder_index();
                    builder.set_message_id(self.messages[index].id.clone());
                }
                self.timeline = Some(builder);
                self.sync_execution();
            }
            ChannelEvent::AgentEnd(data) => {
                self.with_timeline(|builder| builder.on_agent_end(&data));
                self.timeline = None;
            }
            ChannelEvent::AgentError(data) => {
                self.with_timeline(|builder| builder.on_agent_error(&data));
                self.timeline = None;
            }
            ChannelEvent::PhaseStart(data) => self.with_timeline(|b| b.on_phase_start(&data)),
            ChannelEvent::PhaseEnd(data) => self.with_timeline(|b| b.on_phase_end(&data)),
            ChannelEvent::NodeStart(data) => self.with_timeline(|b| b.on_node_start(&data)),
            ChannelEvent::NodeEnd(data) => self.with_timeline(|b| b.on_node_end(&data)),
            ChannelEvent::SubagentStart(data) => self.with_timeline(|b| b.on_subagent_start(&data)),
            ChannelEvent::SubagentEnd(data) => self.with_timeline(|b| b.on_subagent_end(&data)),
            ChannelEvent::ProgressUpdate(data) => self.with_timeline(|b| b.on_progress(&data)),
            ChannelEvent::IterationStart(data) => {
                self.with_timeline(|b| b.on_iteration_start(&data))
            }
            ChannelEvent::IterationEnd(data) => self.with_timeline(|b| b.on_iteration_end(&data)),
            ChannelEvent::StateUpdate(state) => self.last_state = Some(state),
        }

        None
    }

    // =========================================================================
    // Streaming
    // =========================================================================

    fn start_streaming(&mut self, server_id: &str) {
        let index = match self.position_of(server_id) {
            Some(index) if self.messages[index].lifecycle() != MessageLifecycle::Loading => {
                log::debug!("[session] Duplicate streaming_start for {}", server_id);
                return;
            }
            Some(index) => index,
            None => self.placeholder_index(),
        };

        let streaming = convert_to_streaming_message(&self.messages[index], server_id);
        self.messages[index] = streaming;
        self.in_flight = Some(server_id.to_string());
    }

    fn finish_streaming(&mut self, data: StreamEnd) -> Option<Message> {
        let index = match self.position_of(&data.id) {
            Some(index) => index,
            None => {
                // end without start: the in-flight placeholder takes the server id
                let index = self
                    .in_flight_index()
                    .filter(|i| self.messages[*i].lifecycle() == MessageLifecycle::Loading)?;
                let streaming = convert_to_streaming_message(&self.messages[index], &data.id);
                self.messages[index] = streaming;
                index
            }
        };

        if self.messages[index].lifecycle() == MessageLifecycle::Finalized {
            log::debug!("[session] Ignoring repeated streaming_end for {}", data.id);
            return None;
        }

        let mut finalized = finalize_streaming_message(&self.messages[index], data.created_at);
        if let Some(builder) = &self.timeline {
            if builder.message_id().is_some_and(|id| finalized.matches_id(id)) {
                finalized.agent_execution = Some(builder.state().clone());
            }
        }
        self.messages[index] = finalized;

        if self.in_flight.as_deref().is_some_and(|id| self.messages[index].matches_id(id)) {
            self.in_flight = None;
        }
        self.is_processing = false;
        Some(self.messages[index].clone())
    }

    // =========================================================================
    // Messages / Tools
    // =========================================================================

    fn upsert_message(&mut self, message: Message) {
        if message.role == MessageRole::Tool {
            if let ToolPayload::Parsed(descriptor) = parse_tool_payload(&message.content) {
                self.fold_tool_descriptor(
                    &descriptor,
                    Some(message.id.as_str()),
                    descriptor.is_request(),
                );
                return;
            }
        }

        let existing = self
            .messages
            .iter()
            .position(|m| {
                m.matches_id(&message.id)
                    || message.client_id.as_deref().is_some_and(|client_id| m.matches_id(client_id))
            })
            .or_else(|| self.optimistic_echo_target(&message));

        let index = match existing {
            Some(index) => {
                let previous = std::mem::replace(&mut self.messages[index], message);
                let current = &mut self.messages[index];
                if current.client_id.is_none() {
                    current.client_id = previous.client_id;
                }
                if current.tool_calls.is_none() {
                    current.tool_calls = previous.tool_calls;
                }
                if current.agent_execution.is_none() {
                    current.agent_execution = previous.agent_execution;
                }
                index
            }
            None => {
                self.messages.push(message);
                self.messages.len() - 1
            }
        };
        self.correlator.register_message(&self.messages, index);

        let current = &self.messages[index];
        if current.lifecycle() == MessageLifecycle::Finalized
            && self.in_flight.as_deref().is_some_and(|id| current.matches_id(id))
        {
            self.in_flight = None;
            self.is_processing = false;
        }
    }

    /// Oldest optimistic user message still waiting for the server echo of
    /// `message`. Text frames carry no client id, so the echo is matched by
    /// content.
    fn optimistic_echo_target(&self, message: &Message) -> Option<usize> {
        if message.role != MessageRole::User || message.client_id.is_some() {
            return None;
        }
        self.messages.iter().position(|m| {
            m.role == MessageRole::User
                && m.client_id.as_deref() == Some(m.id.as_str())
                && m.content == message.content
        })
    }

    fn apply_tool_event(&mut self, payload: Value, is_request: bool) {
        match ToolEventDescriptor::from_value(&payload) {
            ToolPayload::Parsed(descriptor) => {
                self.fold_tool_descriptor(&descriptor, None, is_request)
            }
            ToolPayload::Unparseable => {
                log::warn!("[session] Keeping unparseable tool payload as a raw tool message");
                self.messages
                    .push(Message::tool(generate_client_id(), payload.to_string()));
            }
        }
    }

    fn fold_tool_descriptor(
        &mut self,
        descriptor: &ToolEventDescriptor,
        fallback_id: Option<&str>,
        is_request: bool,
    ) {
        let now = Some(Utc::now());
        let owner = if !is_request {
            self.correlator
                .apply_response(&mut self.messages, descriptor, fallback_id, now)
        } else if let Some(index) = self.in_flight_index() {
            self.correlator
                .apply_request_at(&mut self.messages, index, descriptor, now)
        } else {
            self.correlator
                .apply_request(&mut self.messages, descriptor, fallback_id, now)
        };

        if owner.is_none() {
            log::debug!("[session] Tool event without correlation key dropped");
        }
    }

    // =========================================================================
    // Timeline
    // =========================================================================

    fn with_timeline(&mut self, apply: impl FnOnce(&mut ExecutionTimelineBuilder)) {
        match self.timeline.as_mut() {
            Some(builder) => {
                apply(builder);
                self.sync_execution();
            }
            None => log::debug!("[session] Execution event without agent_start ignored"),
        }
    }

    /// Copy the live timeline onto the message that owns it
    fn sync_execution(&mut self) {
        let Some(builder) = &self.timeline else {
            return;
        };
        let Some(index) = builder.message_id().and_then(|id| self.position_of(id)) else {
            return;
        };
        self.messages[index].agent_execution = Some(builder.state().clone());
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    fn position_of(&self, id: &str) -> Option<usize> {
        self.messages.iter().rposition(|m| m.matches_id(id))
    }

    fn in_flight_index(&self) -> Option<usize> {
        self.in_flight.as_deref().and_then(|id| self.position_of(id))
    }

    /// Message with `id`, else the in-flight reply
    fn reply_index(&self, id: &str) -> Option<usize> {
        self.position_of(id).or_else(|| self.in_flight_index())
    }

    /// Named message, else the in-flight reply, else the last assistant message
    fn attachment_target(&self, message_id: Option<&str>) -> Option<usize> {
        message_id
            .and_then(|id| self.position_of(id))
            .or_else(|| self.in_flight_index())
            .or_else(|| {
                self.messages
                    .iter()
                    .rposition(|m| m.role == MessageRole::Assistant)
            })
    }

    /// In-flight loading placeholder, created when missing
    fn placeholder_index(&mut self) -> usize {
        if let Some(index) = self
            .in_flight_index()
            .filter(|i| self.messages[*i].lifecycle() == MessageLifecycle::Loading)
        {
            return index;
        }

        let placeholder = create_loading_message();
        self.in_flight = Some(placeholder.id.clone());
        self.messages.push(placeholder);
        self.messages.len() - 1
    }
}
