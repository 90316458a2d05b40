// Tool Event Parser
// Decodes the opaque payload of a tool-role message (or a live tool event)
// into a structured descriptor. Decoding never fails loudly: anything that is
// not a JSON object comes back as `ToolPayload::Unparseable`.

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::models::ToolCallStatus;

/// Event names that mark a tool-call request
const REQUEST_EVENTS: &[&str] = &["tool_call", "tool_call_request"];

/// Result of decoding a tool payload
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    Parsed(ToolEventDescriptor),
    Unparseable,
}

impl ToolPayload {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ToolPayload::Parsed(_))
    }
}

/// Structured view of a tool-call request or response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolEventDescriptor {
    pub event: Option<String>,
    pub id: Option<String>,
    pub tool_call_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub arguments: Option<Map<String, Value>>,
    pub status: Option<String>,
    pub result: Option<Value>,
    pub error: Option<Value>,
    /// Milliseconds since the Unix epoch
    pub timestamp: Option<i64>,
}

impl ToolEventDescriptor {
    /// Build a descriptor from an already-decoded JSON value
    pub fn from_value(value: &Value) -> ToolPayload {
        let Some(obj) = value.as_object() else {
            return ToolPayload::Unparseable;
        };

        ToolPayload::Parsed(Self {
            event: string_field(obj, &["event"]),
            id: string_field(obj, &["id"]),
            tool_call_id: string_field(obj, &["tool_call_id", "toolCallId"]),
            name: string_field(obj, &["name", "tool_name", "toolName"]),
            description: string_field(obj, &["description"]),
            arguments: arguments_field(obj),
            status: string_field(obj, &["status"]),
            result: present(obj.get("result")),
            error: present(obj.get("error")),
            timestamp: obj.get("timestamp").and_then(timestamp_millis),
        })
    }

    /// Whether this descriptor announces a new tool call
    pub fn is_request(&self) -> bool {
        self.event
            .as_deref()
            .map(|e| REQUEST_EVENTS.contains(&e))
            .unwrap_or(false)
    }

    /// Correlation key: `tool_call_id`, then `id`, then the fallback.
    /// Empty strings never count as a key.
    pub fn correlation_key(&self, fallback: Option<&str>) -> Option<String> {
        [self.tool_call_id.as_deref(), self.id.as_deref(), fallback]
            .into_iter()
            .flatten()
            .find(|key| !key.is_empty())
            .map(str::to_string)
    }

    /// Status parsed into the known set; unknown strings are ignored
    pub fn parsed_status(&self) -> Option<ToolCallStatus> {
        let raw = self.status.as_deref()?;
        match raw.parse() {
            Ok(status) => Some(status),
            Err(e) => {
                log::debug!("[tool-parser] Ignoring status: {}", e);
                None
            }
        }
    }

    /// Result as display text: strings pass through, anything else is JSON
    pub fn result_text(&self) -> Option<String> {
        self.result.as_ref().map(value_text)
    }

    pub fn error_text(&self) -> Option<String> {
        self.error.as_ref().map(value_text)
    }
}

/// Decode the content of a tool-role message
pub fn parse_tool_payload(content: &str) -> ToolPayload {
    match serde_json::from_str::<Value>(content) {
        Ok(value) => ToolEventDescriptor::from_value(&value),
        Err(_) => ToolPayload::Unparseable,
    }
}

// ============================================================================
// Field helpers
// ============================================================================

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Arguments arrive either as an object or as a JSON-encoded object string
fn arguments_field(obj: &Map<String, Value>) -> Option<Map<String, Value>> {
    match obj.get("arguments").or_else(|| obj.get("args")) {
        Some(Value::Object(map)) => Some(map.clone()),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

fn present(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !v.is_null()).cloned()
}

fn timestamp_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}
