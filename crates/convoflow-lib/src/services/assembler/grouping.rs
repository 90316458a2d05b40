// Message Assembler
// Folds raw tool-role entries of a stored conversation into assistant
// messages, so a reloaded history looks like the live chat did.

use crate::models::{Message, MessageLifecycle, MessageRole};
use crate::services::timeline::reconstruct_for_message;

use super::correlator::ToolCallCorrelator;
use super::parser::{parse_tool_payload, ToolPayload};

/// Group tool request/response messages with synthetic assistant messages.
///
/// Single forward pass over `messages`:
/// - non-tool messages are cloned through and their tool calls indexed
/// - unparseable tool messages are cloned through unchanged
/// - tool-call requests become an assistant message holding one ToolCall
/// - responses update the matching ToolCall in place (a placeholder is
///   synthesized when the request was never seen)
///
/// The input is never mutated; records created during the pass are updated
/// in place inside the returned vector.
pub fn group_tool_messages_with_assistant(messages: &[Message]) -> Vec<Message> {
    let mut grouped: Vec<Message> = Vec::with_capacity(messages.len());
    let mut correlator = ToolCallCorrelator::new();

    for message in messages {
        if message.role != MessageRole::Tool {
            grouped.push(message.clone());
            correlator.register_message(&grouped, grouped.len() - 1);
            continue;
        }

        let descriptor = match parse_tool_payload(&message.content) {
            ToolPayload::Parsed(descriptor) => descriptor,
            ToolPayload::Unparseable => {
                grouped.push(message.clone());
                continue;
            }
        };

        let fallback_id = Some(message.id.as_str());
        if descriptor.is_request() {
            correlator.apply_request(&mut grouped, &descriptor, fallback_id, message.created_at);
        } else {
            correlator.apply_response(&mut grouped, &descriptor, fallback_id, message.created_at);
        }
    }

    grouped
}

/// Full history pass: grouping, then a reconstructed execution timeline for
/// every finalized message that has persisted node outputs but no live one.
pub fn assemble_history(messages: &[Message]) -> Vec<Message> {
    let mut assembled = group_tool_messages_with_assistant(messages);

    for message in assembled.iter_mut() {
        if message.agent_execution.is_some() || message.lifecycle() != MessageLifecycle::Finalized {
            continue;
        }
        if let Some(execution) = reconstruct_for_message(message) {
            message.agent_execution = Some(execution);
        }
    }

    assembled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentMetadata, ToolCall, ToolCallStatus};
    use crate::services::assembler::correlator::{DEFAULT_TOOL_NAME, UNKNOWN_TIMESTAMP};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_non_tool_messages_are_cloned() {
        let input = vec![
            Message::user("u1", "Hello"),
            Message::assistant("a1", "Hi there").with_tool_calls(vec![ToolCall::new(
                "call_1",
                "search",
                ToolCallStatus::Executing,
            )]),
            Message::system("s1", "note"),
        ];

        let mut output = group_tool_messages_with_assistant(&input);
        assert_eq!(output, input);

        output[0].content.push_str(" mutated");
        output[1].tool_calls.as_mut().unwrap()[0].status = ToolCallStatus::Failed;
        assert_eq!(input[0].content, "Hello");
        assert_eq!(input[1].tool_calls.as_ref().unwrap()[0].status, ToolCallStatus::Executing);
    }

    #[test]
    fn test_unparseable_tool_message_passes_through() {
        let input = vec![Message::tool("t1", "plain tool output, not json")];

        let output = group_tool_messages_with_assistant(&input);
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].role, MessageRole::Tool);
        assert_eq!(output[0].content, "plain tool output, not json");
    }

    #[test]
    fn test_request_and_response_fold_into_one_message() {
        let request = json!({
            "event": "tool_call",
            "id": "call_1",
            "name": "web_search",
            "arguments": {"q": "rust"}
        });
        let response = json!({
            "event": "tool_result",
            "tool_call_id": "call_1",
            "status": "completed",
            "result": {"hits": 3}
        });
        let input = vec![
            Message::user("u1", "Search for rust"),
            Message::tool("t1", request.to_string()),
            Message::tool("t2", response.to_string()),
        ];

        let output = group_tool_messages_with_assistant(&input);
        assert_eq!(output.len(), 2);

        let assistant = &output[1];
        assert_eq!(assistant.role, MessageRole::Assistant);
        assert_eq!(assistant.content, "");
        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "web_search");
        assert_eq!(calls[0].arguments["q"], "rust");
        assert_eq!(calls[0].status, ToolCallStatus::Completed);
        assert_eq!(calls[0].result.as_deref(), Some(r#"{"hits":3}"#));
    }

    #[test]
    fn test_request_defaults_to_waiting_confirmation() {
        let input = vec![Message::tool(
            "t1",
            json!({"event": "tool_call", "id": "call_1", "name": "delete_file"}).to_string(),
        )];

        let output = group_tool_messages_with_assistant(&input);
        let call = &output[0].tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.status, ToolCallStatus::WaitingConfirmation);
    }

    #[test]
    fn test_orphan_response_synthesizes_placeholder() {
        let input = vec![Message::tool(
            "t9",
            json!({"tool_call_id": "call_7", "status": "failed", "result": "partial"}).to_string(),
        )];

        let output = group_tool_messages_with_assistant(&input);
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].role, MessageRole::Assistant);
        let call = &output[0].tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.name, DEFAULT_TOOL_NAME);
        assert_eq!(call.status, ToolCallStatus::Failed);
        assert_eq!(call.result.as_deref(), Some("partial"));
    }

    #[test]
    fn test_response_falls_back_to_raw_message_id() {
        let input = vec![Message::tool("raw-5", json!({"result": "done"}).to_string())];

        let output = group_tool_messages_with_assistant(&input);
        let call = &output[0].tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.id, "raw-5");
        assert_eq!(call.status, ToolCallStatus::Completed);
    }

    #[test]
    fn test_response_updates_call_on_stored_assistant_message() {
        let input = vec![
            Message::assistant("a1", "Running a search").with_tool_calls(vec![ToolCall::new(
                "call_1",
                "web_search",
                ToolCallStatus::Executing,
            )]),
            Message::tool("t1", json!({"tool_call_id": "call_1", "result": "ok"}).to_string()),
        ];

        let output = group_tool_messages_with_assistant(&input);
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].tool_calls.as_ref().unwrap()[0].result.as_deref(), Some("ok"));
        assert_eq!(input[0].tool_calls.as_ref().unwrap()[0].result, None);
    }

    #[test]
    fn test_repeated_responses_keep_overwriting() {
        let input = vec![
            Message::tool("t1", json!({"event": "tool_call", "id": "c1"}).to_string()),
            Message::user("u1", "any update?"),
            Message::tool("t2", json!({"tool_call_id": "c1", "status": "executing"}).to_string()),
            Message::tool(
                "t3",
                json!({"tool_call_id": "c1", "status": "completed", "result": "v2"}).to_string(),
            ),
        ];

        let output = group_tool_messages_with_assistant(&input);
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].id, "tool-c1");
        assert_eq!(output[1].id, "u1");
        let call = &output[0].tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.status, ToolCallStatus::Completed);
        assert_eq!(call.result.as_deref(), Some("v2"));
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let input = vec![
            Message::tool("t1", json!({"event": "tool_call", "id": "c1"}).to_string())
                .with_created_at(created),
            Message::tool("t2", json!({"tool_call_id": "c1", "result": "ok"}).to_string())
                .with_created_at(created),
        ];

        assert_eq!(
            group_tool_messages_with_assistant(&input),
            group_tool_messages_with_assistant(&input)
        );
    }

    #[test]
    fn test_grouping_without_timestamps_is_deterministic() {
        let input = vec![
            Message::tool("t1", json!({"event": "tool_call", "id": "c1"}).to_string()),
            Message::tool("t2", json!({"tool_call_id": "c2", "result": "ok"}).to_string()),
        ];

        let first = group_tool_messages_with_assistant(&input);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = group_tool_messages_with_assistant(&input);

        assert_eq!(first, second);
        for message in &first {
            assert_eq!(message.created_at, None);
            assert_eq!(message.tool_calls.as_ref().unwrap()[0].timestamp, UNKNOWN_TIMESTAMP);
        }
    }

    #[test]
    fn test_assemble_history_reconstructs_timeline() {
        let mut reply = Message::assistant("a1", "Here is the report");
        let mut node_outputs = serde_json::Map::new();
        node_outputs.insert("clarify_with_user".to_string(), json!("Q?"));
        reply.agent_metadata = Some(AgentMetadata {
            node_outputs,
            ..AgentMetadata::default()
        });

        let output = assemble_history(&[Message::user("u1", "research"), reply]);
        assert!(output[0].agent_execution.is_none());
        let execution = output[1].agent_execution.as_ref().unwrap();
        assert_eq!(execution.phases.len(), 1);
        assert_eq!(execution.phases[0].streamed_content.as_deref(), Some("Q?"));
    }
}
