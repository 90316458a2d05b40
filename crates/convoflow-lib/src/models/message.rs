// Conversation message models
// Messages, tool calls and the persisted agent metadata carried by finalized replies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::execution::AgentExecutionState;

// ============================================================================
// Core Entities
// ============================================================================

/// Message entity - one entry of a conversation, user-facing or raw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server identifier, or the client id while no server id exists yet
    pub id: String,
    /// Client-side identifier assigned before the server id is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Message author role
    pub role: MessageRole,
    /// Text content (grows monotonically while streaming)
    #[serde(default)]
    pub content: String,
    /// Tool calls owned by this message, in request order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    /// Reasoning text streamed before the answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_loading: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_streaming: Option<bool>,
    #[serde(rename = "created_at", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Flat node output summary persisted with a finalized reply
    #[serde(rename = "agent_metadata", default, skip_serializing_if = "Option::is_none")]
    pub agent_metadata: Option<AgentMetadata>,
    /// Execution timeline, attached lazily (live or reconstructed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_execution: Option<AgentExecutionState>,
}

impl Message {
    /// Create a bare message with the given identity and content
    pub fn new(id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client_id: None,
            role,
            content: content.into(),
            tool_calls: None,
            attachments: None,
            citations: None,
            thinking_content: None,
            is_loading: None,
            is_streaming: None,
            created_at: None,
            agent_metadata: None,
            agent_execution: None,
        }
    }

    /// Create a user message
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, MessageRole::Assistant, content)
    }

    /// Create a tool message carrying a raw event payload
    pub fn tool(id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(id, MessageRole::Tool, payload)
    }

    /// Create a system message
    pub fn system(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, MessageRole::System, content)
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(tool_calls);
        self
    }

    /// Current lifecycle state derived from the transient flags
    pub fn lifecycle(&self) -> MessageLifecycle {
        if self.is_loading == Some(true) {
            MessageLifecycle::Loading
        } else if self.is_streaming == Some(true) {
            MessageLifecycle::Streaming
        } else {
            MessageLifecycle::Finalized
        }
    }

    /// Whether this message answers to `id`, either as server id or client id
    pub fn matches_id(&self, id: &str) -> bool {
        self.id == id || self.client_id.as_deref() == Some(id)
    }

    /// Node outputs persisted with this message, if any
    pub fn node_outputs(&self) -> Option<&Map<String, Value>> {
        self.agent_metadata.as_ref().map(|m| &m.node_outputs)
    }
}

/// Lifecycle of an assistant reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLifecycle {
    /// Client-only placeholder waiting for the server
    Loading,
    /// Server id assigned, content arriving
    Streaming,
    /// Stream ended, transient flags stripped
    Finalized,
}

// ============================================================================
// Enums
// ============================================================================

/// Message author role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "tool" => Ok(MessageRole::Tool),
            "system" => Ok(MessageRole::System),
            _ => Err(format!("Invalid message role: {}", s)),
        }
    }
}

/// Tool call status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    WaitingConfirmation,
    Executing,
    Completed,
    Failed,
}

impl std::fmt::Display for ToolCallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolCallStatus::WaitingConfirmation => write!(f, "waiting_confirmation"),
            ToolCallStatus::Executing => write!(f, "executing"),
            ToolCallStatus::Completed => write!(f, "completed"),
            ToolCallStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ToolCallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "waiting_confirmation" => Ok(ToolCallStatus::WaitingConfirmation),
            "executing" => Ok(ToolCallStatus::Executing),
            "completed" => Ok(ToolCallStatus::Completed),
            "failed" => Ok(ToolCallStatus::Failed),
            _ => Err(format!("Invalid tool call status: {}", s)),
        }
    }
}

// ============================================================================
// Tool Calling
// ============================================================================

/// A single tool invocation, owned by the message that carries it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Correlation key, unique within a conversation
    pub id: String,
    /// Tool/function name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tool parameters
    #[serde(default)]
    pub arguments: Map<String, Value>,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: i64,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: ToolCallStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            arguments: Map::new(),
            status,
            result: None,
            error: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

// ============================================================================
// Attachments / Citations
// ============================================================================

/// File attached to a message (uploads and generated files)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Search citation attached to an assistant reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

// ============================================================================
// Persisted Execution Metadata
// ============================================================================

/// Execution summary persisted with a finalized reply.
///
/// `node_outputs` is the only persisted trace of an agent run; timelines of
/// historical messages are rebuilt from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    #[serde(default)]
    pub node_outputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}
