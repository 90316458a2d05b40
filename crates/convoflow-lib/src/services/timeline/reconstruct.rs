// Execution Timeline Reconstruction
// Rebuilds an AgentExecutionState from the flat `node_outputs` map persisted
// with a finalized reply, once the original event stream is gone.

use serde_json::{Map, Value};

use crate::models::{AgentExecutionState, ExecutionStatus, Message, PhaseExecution, PhaseStatus};

/// Maximum characters kept in `outputSummary`
pub const SUMMARY_MAX_CHARS: usize = 200;

/// Object fields checked, in order, for a node's text output
const CONTENT_FIELDS: &[&str] = &["verification", "content", "result", "output", "message", "text"];

/// Known nodes in execution order, with their display names
pub const CANONICAL_NODES: &[(&str, &str)] = &[
    ("clarify_with_user", "Clarify with User"),
    ("write_research_brief", "Write Research Brief"),
    ("research_supervisor", "Research Supervisor"),
    ("supervisor", "Supervisor"),
    ("supervisor_tools", "Supervisor Tools"),
    ("researcher", "Researcher"),
    ("researcher_tools", "Researcher Tools"),
    ("compress_research", "Compress Research"),
    ("final_report_generation", "Final Report Generation"),
    ("verify_report", "Verify Report"),
];

const RECONSTRUCTED_AGENT_ID: &str = "reconstructed";
const RECONSTRUCTED_AGENT_NAME: &str = "Agent";
const RECONSTRUCTED_AGENT_TYPE: &str = "graph";

/// Display name for a node id: the canonical name, or the id title-cased
pub fn display_name(node_id: &str) -> String {
    if let Some((_, name)) = CANONICAL_NODES.iter().find(|(id, _)| *id == node_id) {
        return (*name).to_string();
    }

    node_id
        .split(&['_', '-'][..])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract displayable text from an arbitrary node output.
///
/// Strings are used verbatim; objects yield their first string field from
/// the priority list; anything else is pretty-printed.
pub fn extract_node_content(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        Value::Object(map) => CONTENT_FIELDS
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| pretty(output)),
        other => pretty(other),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Truncate to `SUMMARY_MAX_CHARS` characters with a `...` suffix
pub fn truncate_summary(text: &str) -> String {
    if text.chars().count() > SUMMARY_MAX_CHARS {
        let truncated: String = text.chars().take(SUMMARY_MAX_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

/// Completed phase for one persisted node output
pub fn phase_from_output(node_id: &str, output: &Value) -> PhaseExecution {
    let content = extract_node_content(output);
    let mut phase = PhaseExecution::new(node_id, display_name(node_id), PhaseStatus::Completed);
    phase.output_summary = Some(truncate_summary(&content));
    phase.streamed_content = Some(content);
    phase
}

/// Rebuild an execution timeline from persisted node outputs.
///
/// Known nodes come first in canonical order; the rest follow in the map's
/// own order. Returns `None` for a missing or empty map.
pub fn reconstruct_agent_execution_from_metadata(
    node_outputs: Option<&Map<String, Value>>,
) -> Option<AgentExecutionState> {
    let node_outputs = node_outputs.filter(|outputs| !outputs.is_empty())?;

    let mut phases: Vec<PhaseExecution> = CANONICAL_NODES
        .iter()
        .filter_map(|(id, _)| node_outputs.get(*id).map(|output| phase_from_output(id, output)))
        .collect();

    phases.extend(
        node_outputs
            .iter()
            .filter(|(id, _)| !is_canonical(id))
            .map(|(id, output)| phase_from_output(id, output)),
    );

    Some(AgentExecutionState {
        agent_id: RECONSTRUCTED_AGENT_ID.to_string(),
        agent_name: RECONSTRUCTED_AGENT_NAME.to_string(),
        agent_type: RECONSTRUCTED_AGENT_TYPE.to_string(),
        execution_id: RECONSTRUCTED_AGENT_ID.to_string(),
        status: ExecutionStatus::Completed,
        phases,
        subagents: Vec::new(),
        current_iteration: None,
        error: None,
    })
}

/// Reconstruct the timeline of a stored message, using the agent identity
/// persisted next to the node outputs when present.
pub fn reconstruct_for_message(message: &Message) -> Option<AgentExecutionState> {
    let metadata = message.agent_metadata.as_ref()?;
    let mut execution = reconstruct_agent_execution_from_metadata(Some(&metadata.node_outputs))?;

    execution.execution_id = metadata
        .execution_id
        .clone()
        .unwrap_or_else(|| format!("{}-{}", message.id, RECONSTRUCTED_AGENT_ID));
    if let Some(agent_id) = &metadata.agent_id {
        execution.agent_id = agent_id.clone();
    }
    if let Some(agent_name) = &metadata.agent_name {
        execution.agent_name = agent_name.clone();
    }
    if let Some(agent_type) = &metadata.agent_type {
        execution.agent_type = agent_type.clone();
    }
    Some(execution)
}

fn is_canonical(node_id: &str) -> bool {
    CANONICAL_NODES.iter().any(|(id, _)| *id == node_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentMetadata;
    use serde_json::json;

    fn outputs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_missing_or_empty_metadata() {
        assert!(reconstruct_agent_execution_from_metadata(None).is_none());
        assert!(reconstruct_agent_execution_from_metadata(Some(&Map::new())).is_none());
    }

    #[test]
    fn test_canonical_nodes() {
        let map = outputs(json!({
            "clarify_with_user": "Q?",
            "write_research_brief": { "content": "Brief text" }
        }));

        let execution = reconstruct_agent_execution_from_metadata(Some(&map)).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.phases.len(), 2);

        let first = &execution.phases[0];
        assert_eq!(first.id, "clarify_with_user");
        assert_eq!(first.name, "Clarify with User");
        assert_eq!(first.status, PhaseStatus::Completed);
        assert_eq!(first.streamed_content.as_deref(), Some("Q?"));
        assert_eq!(first.output_summary.as_deref(), Some("Q?"));

        let second = &execution.phases[1];
        assert_eq!(second.id, "write_research_brief");
        assert_eq!(second.streamed_content.as_deref(), Some("Brief text"));
        assert_eq!(second.output_summary.as_deref(), Some("Brief text"));
    }

    #[test]
    fn test_canonical_order_wins_over_map_order() {
        let map = outputs(json!({
            "final_report_generation": "Report",
            "custom_step": "extra",
            "clarify_with_user": "Q?"
        }));

        let execution = reconstruct_agent_execution_from_metadata(Some(&map)).unwrap();
        let ids: Vec<&str> = execution.phases.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["clarify_with_user", "final_report_generation", "custom_step"]);
        assert_eq!(execution.phases[2].name, "Custom Step");
    }

    #[test]
    fn test_unknown_nodes_keep_map_order() {
        let map = outputs(json!({ "zeta_node": "z", "alpha_node": "a" }));

        let execution = reconstruct_agent_execution_from_metadata(Some(&map)).unwrap();
        let ids: Vec<&str> = execution.phases.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta_node", "alpha_node"]);
    }

    #[test]
    fn test_content_field_priority() {
        assert_eq!(
            extract_node_content(&json!({ "content": "c", "verification": "v" })),
            "v"
        );
        assert_eq!(extract_node_content(&json!({ "text": "t", "output": "o" })), "o");
        // non-string fields are skipped
        assert_eq!(extract_node_content(&json!({ "content": 5, "message": "m" })), "m");
    }

    #[test]
    fn test_content_falls_back_to_pretty_json() {
        let value = json!({ "score": 3 });
        assert_eq!(extract_node_content(&value), "{\n  \"score\": 3\n}");
        assert_eq!(extract_node_content(&json!([1, 2])), "[\n  1,\n  2\n]");
        assert_eq!(extract_node_content(&Value::Null), "null");
    }

    #[test]
    fn test_summary_truncation() {
        let long = "é".repeat(250);
        let summary = truncate_summary(&long);
        assert_eq!(summary.chars().count(), SUMMARY_MAX_CHARS + 3);
        assert!(summary.ends_with("..."));

        let exact = "x".repeat(SUMMARY_MAX_CHARS);
        assert_eq!(truncate_summary(&exact), exact);

        let map = outputs(json!({ "researcher": long.clone() }));
        let execution = reconstruct_agent_execution_from_metadata(Some(&map)).unwrap();
        assert_eq!(execution.phases[0].streamed_content.as_deref(), Some(long.as_str()));
        assert_eq!(execution.phases[0].output_summary.as_deref(), Some(summary.as_str()));
    }

    #[test]
    fn test_reconstruct_for_message_uses_identity() {
        let mut message = Message::assistant("a1", "done");
        message.agent_metadata = Some(AgentMetadata {
            node_outputs: outputs(json!({ "supervisor": "plan" })),
            agent_id: Some("deep_research".to_string()),
            agent_name: Some("Deep Research".to_string()),
            agent_type: None,
            execution_id: None,
        });

        let execution = reconstruct_for_message(&message).unwrap();
        assert_eq!(execution.agent_id, "deep_research");
        assert_eq!(execution.agent_name, "Deep Research");
        assert_eq!(execution.agent_type, RECONSTRUCTED_AGENT_TYPE);
        assert_eq!(execution.execution_id, "a1-reconstructed");
    }

    #[test]
    fn test_display_names() {
        assert_eq!(display_name("compress_research"), "Compress Research");
        assert_eq!(display_name("fact-check_pass"), "Fact Check Pass");
    }
}
