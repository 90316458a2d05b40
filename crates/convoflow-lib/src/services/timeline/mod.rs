// Agent Execution Timeline
// Live timelines built from execution events, and timelines reconstructed
// from persisted node outputs for messages loaded from history.

pub mod builder;
pub mod reconstruct;

pub use builder::ExecutionTimelineBuilder;
pub use reconstruct::{
    display_name, extract_node_content, phase_from_output,
    reconstruct_agent_execution_from_metadata, reconstruct_for_message, truncate_summary,
    CANONICAL_NODES, SUMMARY_MAX_CHARS,
};

use crate::models::{AgentExecutionState, Message};

/// Timeline to display for a message: the live one when attached,
/// otherwise one rebuilt from persisted metadata.
pub fn execution_for_message(message: &Message) -> Option<AgentExecutionState> {
    message
        .agent_execution
        .clone()
        .or_else(|| reconstruct_for_message(message))
}
