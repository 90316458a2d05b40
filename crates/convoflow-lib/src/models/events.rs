// Real-time channel events
// Typed form of the frames delivered over the conversation channel,
// plus the control frames sent back to the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::execution::{ExecutionStatus, PhaseStatus};
use super::message::{Attachment, Citation, Message};

// ============================================================================
// Inbound Events
// ============================================================================

/// Inbound channel event, tagged by `type` with its payload under `data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// Server accepted the request and is working on it
    Processing,
    /// Server is preparing a reply
    Loading,
    StreamingStart(StreamRef),
    StreamingChunk(StreamChunk),
    StreamingEnd(StreamEnd),
    ThinkingStart(StreamRef),
    ThinkingChunk(StreamChunk),
    ThinkingEnd(StreamRef),
    /// Complete message (user echo, stored reply, system notice)
    Message(Box<Message>),
    SearchCitations(CitationsPayload),
    GeneratedFiles(GeneratedFilesPayload),
    /// Tool-call request; payload is decoded by the tool event parser
    ToolCall(Value),
    /// Tool-call response or status update
    ToolResult(Value),
    AgentStart(AgentStartData),
    AgentEnd(AgentEndData),
    AgentError(AgentErrorData),
    PhaseStart(PhaseStartData),
    PhaseEnd(PhaseEndData),
    NodeStart(NodeStartData),
    NodeEnd(NodeEndData),
    SubagentStart(SubagentStartData),
    SubagentEnd(SubagentEndData),
    ProgressUpdate(ProgressUpdateData),
    IterationStart(IterationData),
    IterationEnd(IterationData),
    /// Opaque agent state snapshot
    StateUpdate(Value),
}

impl ChannelEvent {
    /// Wire tag of this event
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelEvent::Processing => "processing",
            ChannelEvent::Loading => "loading",
            ChannelEvent::StreamingStart(_) => "streaming_start",
            ChannelEvent::StreamingChunk(_) => "streaming_chunk",
            ChannelEvent::StreamingEnd(_) => "streaming_end",
            ChannelEvent::ThinkingStart(_) => "thinking_start",
            ChannelEvent::ThinkingChunk(_) => "thinking_chunk",
            ChannelEvent::ThinkingEnd(_) => "thinking_end",
            ChannelEvent::Message(_) => "message",
            ChannelEvent::SearchCitations(_) => "search_citations",
            ChannelEvent::GeneratedFiles(_) => "generated_files",
            ChannelEvent::ToolCall(_) => "tool_call",
            ChannelEvent::ToolResult(_) => "tool_result",
            ChannelEvent::AgentStart(_) => "agent_start",
            ChannelEvent::AgentEnd(_) => "agent_end",
            ChannelEvent::AgentError(_) => "agent_error",
            ChannelEvent::PhaseStart(_) => "phase_start",
            ChannelEvent::PhaseEnd(_) => "phase_end",
            ChannelEvent::NodeStart(_) => "node_start",
            ChannelEvent::NodeEnd(_) => "node_end",
            ChannelEvent::SubagentStart(_) => "subagent_start",
            ChannelEvent::SubagentEnd(_) => "subagent_end",
            ChannelEvent::ProgressUpdate(_) => "progress_update",
            ChannelEvent::IterationStart(_) => "iteration_start",
            ChannelEvent::IterationEnd(_) => "iteration_end",
            ChannelEvent::StateUpdate(_) => "state_update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEnd {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationsPayload {
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFilesPayload {
    #[serde(default)]
    pub files: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

// ============================================================================
// Execution Progress Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStartData {
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub agent_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    /// Reply the timeline belongs to; defaults to the in-flight reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEndData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentErrorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStartData {
    pub phase_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseEndData {
    pub phase_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PhaseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStartData {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEndData {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PhaseStatus>,
    /// Raw node output, summarised with the same heuristic as persisted outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentStartData {
    pub subagent_id: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentEndData {
    pub subagent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Text delta appended to the phase's streamed content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationData {
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_id: Option<String>,
}

// ============================================================================
// Outbound Control / Connection Status
// ============================================================================

/// Control frame sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundControl {
    ToolCallConfirm { tool_call_id: String },
    ToolCallCancel { tool_call_id: String },
}

/// Connection status delivered to channel listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub error: Option<String>,
}

impl ConnectionStatus {
    pub fn connected() -> Self {
        Self {
            connected: true,
            error: None,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            connected: false,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            error: Some(error.into()),
        }
    }
}
