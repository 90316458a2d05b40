// Live Execution Timeline Builder
// Accumulates agent/phase/node/sub-agent events into an AgentExecutionState,
// keyed by id and kept in arrival order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::reconstruct::{display_name, extract_node_content, truncate_summary};
use crate::models::{
    AgentEndData, AgentErrorData, AgentExecutionState, AgentStartData, ExecutionStatus,
    IterationData, NodeEndData, NodeExecution, NodeStartData, PhaseEndData, PhaseExecution,
    PhaseStartData, PhaseStatus, ProgressUpdateData, SubagentEndData, SubagentExecution,
    SubagentStartData,
};

/// Builder for the execution timeline of one live agent run
#[derive(Debug, Clone)]
pub struct ExecutionTimelineBuilder {
    state: AgentExecutionState,
    message_id: Option<String>,
    started_at: HashMap<String, DateTime<Utc>>,
}

impl ExecutionTimelineBuilder {
    /// Begin a new execution from an `agent_start` event
    pub fn start(data: &AgentStartData) -> Self {
        let execution_id = data
            .execution_id
            .clone()
            .unwrap_or_else(|| format!("exec_{}", Uuid::new_v4().simple()));
        log::debug!("[timeline] Execution {} started for agent {}", execution_id, data.agent_id);

        Self {
            state: AgentExecutionState {
                agent_id: data.agent_id.clone(),
                agent_name: if data.agent_name.is_empty() {
                    display_name(&data.agent_id)
                } else {
                    data.agent_name.clone()
                },
                agent_type: data.agent_type.clone(),
                execution_id,
                status: ExecutionStatus::Running,
                phases: Vec::new(),
                subagents: Vec::new(),
                current_iteration: None,
                error: None,
            },
            message_id: data.message_id.clone(),
            started_at: HashMap::new(),
        }
    }

    pub fn state(&self) -> &AgentExecutionState {
        &self.state
    }

    pub fn into_state(self) -> AgentExecutionState {
        self.state
    }

    pub fn execution_id(&self) -> &str {
        &self.state.execution_id
    }

    /// Message the timeline is attached to
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn set_message_id(&mut self, message_id: impl Into<String>) {
        self.message_id = Some(message_id.into());
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state.status,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    // =========================================================================
    // Phases
    // =========================================================================

    pub fn on_phase_start(&mut self, data: &PhaseStartData) {
        let name = data.name.clone().unwrap_or_else(|| display_name(&data.phase_id));
        let index = self.ensure_phase(&data.phase_id, &name);
        self.state.phases[index].status = PhaseStatus::Running;
        self.started_at.insert(phase_key(&data.phase_id), Utc::now());
    }

    pub fn on_phase_end(&mut self, data: &PhaseEndData) {
        let index = self.ensure_phase(&data.phase_id, &display_name(&data.phase_id));
        let measured = self.elapsed_ms(&phase_key(&data.phase_id));
        let phase = &mut self.state.phases[index];

        phase.status = data.status.unwrap_or(PhaseStatus::Completed);
        phase.output_summary = data
            .output_summary
            .clone()
            .or_else(|| phase.streamed_content.as_deref().map(truncate_summary))
            .or_else(|| phase.output_summary.take());
        phase.duration_ms = data.duration_ms.or(measured);
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Start a node. Nodes naming no known phase join the last running
    /// phase; with no running phase the node becomes a phase of its own.
    pub fn on_node_start(&mut self, data: &NodeStartData) {
        let name = data.name.clone().unwrap_or_else(|| display_name(&data.node_id));
        self.started_at.insert(node_key(&data.node_id), Utc::now());

        let target = data
            .phase_id
            .as_deref()
            .and_then(|id| self.phase_index(id))
            .or_else(|| self.running_phase_index());

        let Some(index) = target else {
            let index = self.ensure_phase(&data.node_id, &name);
            self.state.phases[index].status = PhaseStatus::Running;
            return;
        };

        let phase = &mut self.state.phases[index];
        if phase.id == data.node_id {
            phase.status = PhaseStatus::Running;
            return;
        }
        match phase.nodes.iter_mut().find(|n| n.id == data.node_id) {
            Some(node) => node.status = PhaseStatus::Running,
            None => phase.nodes.push(NodeExecution {
                id: data.node_id.clone(),
                name,
                status: PhaseStatus::Running,
                output_summary: None,
                duration_ms: None,
            }),
        }
    }

    pub fn on_node_end(&mut self, data: &NodeEndData) {
        let status = data.status.unwrap_or(PhaseStatus::Completed);
        let content = data.output.as_ref().map(extract_node_content);
        let duration = data.duration_ms.or_else(|| self.elapsed_ms(&node_key(&data.node_id)));

        if let Some(node) = self.node_mut(&data.node_id) {
            node.status = status;
            node.duration_ms = duration;
            if let Some(content) = &content {
                node.output_summary = Some(truncate_summary(content));
            }
            return;
        }

        // node tracked as its own phase, or never announced
        let index = self.ensure_phase(&data.node_id, &display_name(&data.node_id));
        let phase = &mut self.state.phases[index];
        phase.status = status;
        phase.duration_ms = duration;
        if let Some(content) = content {
            phase.output_summary = Some(truncate_summary(&content));
            if phase.streamed_content.is_none() {
                phase.streamed_content = Some(content);
            }
        }
    }

    // =========================================================================
    // Sub-agents
    // =========================================================================

    pub fn on_subagent_start(&mut self, data: &SubagentStartData) {
        let subagent = SubagentExecution {
            id: data.subagent_id.clone(),
            agent_name: if data.agent_name.is_empty() {
                display_name(&data.subagent_id)
            } else {
                data.agent_name.clone()
            },
            agent_type: data.agent_type.clone(),
            parent_id: data.parent_id.clone(),
            depth: data.depth,
            status: ExecutionStatus::Running,
            error: None,
        };

        match self.state.subagents.iter_mut().find(|s| s.id == data.subagent_id) {
            Some(existing) => *existing = subagent,
            None => self.state.subagents.push(subagent),
        }
    }

    pub fn on_subagent_end(&mut self, data: &SubagentEndData) {
        let Some(subagent) = self
            .state
            .subagents
            .iter_mut()
            .find(|s| s.id == data.subagent_id)
        else {
            log::debug!("[timeline] subagent_end for unknown sub-agent {}", data.subagent_id);
            return;
        };

        subagent.status = match (&data.error, data.status) {
            (Some(_), _) => ExecutionStatus::Failed,
            (None, Some(status)) => status,
            (None, None) => ExecutionStatus::Completed,
        };
        subagent.error = data.error.clone();
    }

    // =========================================================================
    // Progress / Iterations / Agent
    // =========================================================================

    /// Append streamed text to the phase the update names, the phase owning
    /// the named node, or the last running phase.
    pub fn on_progress(&mut self, data: &ProgressUpdateData) {
        let Some(content) = data.content.as_deref().filter(|c| !c.is_empty()) else {
            return;
        };

        let target = data
            .phase_id
            .as_deref()
            .and_then(|id| self.phase_index(id))
            .or_else(|| data.node_id.as_deref().and_then(|id| self.node_owner_index(id)))
            .or_else(|| self.running_phase_index());

        match target {
            Some(index) => self.state.phases[index]
                .streamed_content
                .get_or_insert_with(String::new)
                .push_str(content),
            None => log::debug!("[timeline] progress_update with no phase to attach to"),
        }
    }

    pub fn on_iteration_start(&mut self, data: &IterationData) {
        self.state.current_iteration = Some(data.iteration);
    }

    pub fn on_iteration_end(&mut self, data: &IterationData) {
        if self.state.current_iteration.map_or(true, |current| current <= data.iteration) {
            self.state.current_iteration = Some(data.iteration);
        }
    }

    /// Close the execution; still-running phases and nodes take the outcome
    pub fn on_agent_end(&mut self, data: &AgentEndData) {
        let status = data.status.unwrap_or(ExecutionStatus::Completed);
        self.state.status = status;
        self.close_running(if status == ExecutionStatus::Completed {
            PhaseStatus::Completed
        } else {
            PhaseStatus::Failed
        });
        log::debug!("[timeline] Execution {} ended: {}", self.state.execution_id, status);
    }

    pub fn on_agent_error(&mut self, data: &AgentErrorData) {
        self.state.status = ExecutionStatus::Failed;
        self.state.error = Some(data.error.clone());
        self.close_running(PhaseStatus::Failed);
        log::warn!("[timeline] Execution {} failed: {}", self.state.execution_id, data.error);
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn phase_index(&self, id: &str) -> Option<usize> {
        self.state.phases.iter().position(|p| p.id == id)
    }

    fn running_phase_index(&self) -> Option<usize> {
        self.state
            .phases
            .iter()
            .rposition(|p| p.status == PhaseStatus::Running)
    }

    fn node_owner_index(&self, node_id: &str) -> Option<usize> {
        self.state
            .phases
            .iter()
            .position(|p| p.id == node_id || p.nodes.iter().any(|n| n.id == node_id))
    }

    fn node_mut(&mut self, node_id: &str) -> Option<&mut NodeExecution> {
        self.state
            .phases
            .iter_mut()
            .flat_map(|p| p.nodes.iter_mut())
            .find(|n| n.id == node_id)
    }

    fn ensure_phase(&mut self, id: &str, name: &str) -> usize {
        if let Some(index) = self.phase_index(id) {
            return index;
        }
        self.state
            .phases
            .push(PhaseExecution::new(id, name, PhaseStatus::Pending));
        self.state.phases.len() - 1
    }

    fn elapsed_ms(&self, key: &str) -> Option<i64> {
        self.started_at
            .get(key)
            .map(|start| (Utc::now() - *start).num_milliseconds())
    }

    fn close_running(&mut self, status: PhaseStatus) {
        for phase in self.state.phases.iter_mut() {
            if phase.status == PhaseStatus::Running {
                phase.status = status;
            }
            for node in phase.nodes.iter_mut() {
                if node.status == PhaseStatus::Running {
                    node.status = status;
                }
            }
        }
    }
}

fn phase_key(id: &str) -> String {
    format!("phase:{}", id)
}

fn node_key(id: &str) -> String {
    format!("node:{}", id)
}
