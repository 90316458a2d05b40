// Agent execution models
// Hierarchical timeline of a multi-step agent run: phases -> nodes, plus sub-agents.
// The same shape is produced live and by reconstruction from persisted metadata.

use serde::{Deserialize, Serialize};

/// Overall status of an agent execution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "pending"),
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            _ => Err(format!("Invalid execution status: {}", s)),
        }
    }
}

/// Status of a phase or node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl PhaseStatus {
    /// Whether no further transitions are expected
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PhaseStatus::Completed | PhaseStatus::Failed | PhaseStatus::Skipped
        )
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseStatus::Pending => write!(f, "pending"),
            PhaseStatus::Running => write!(f, "running"),
            PhaseStatus::Completed => write!(f, "completed"),
            PhaseStatus::Failed => write!(f, "failed"),
            PhaseStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for PhaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PhaseStatus::Pending),
            "running" => Ok(PhaseStatus::Running),
            "completed" => Ok(PhaseStatus::Completed),
            "failed" => Ok(PhaseStatus::Failed),
            "skipped" => Ok(PhaseStatus::Skipped),
            _ => Err(format!("Invalid phase status: {}", s)),
        }
    }
}

/// Finer-grained step inside a phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecution {
    pub id: String,
    pub name: String,
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

/// Named stage of an agent execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseExecution {
    pub id: String,
    pub name: String,
    pub status: PhaseStatus,
    #[serde(default)]
    pub nodes: Vec<NodeExecution>,
    /// Truncated human-readable output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<String>,
    /// Full streamed text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streamed_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl PhaseExecution {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: PhaseStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
            nodes: Vec::new(),
            output_summary: None,
            streamed_content: None,
            duration_ms: None,
        }
    }
}

/// Nested agent execution spawned by the parent agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentExecution {
    pub id: String,
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Nesting level, used for indentation
    #[serde(default)]
    pub depth: u32,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Execution timeline attached to an assistant reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentExecutionState {
    pub agent_id: String,
    pub agent_name: String,
    pub agent_type: String,
    pub execution_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub phases: Vec<PhaseExecution>,
    #[serde(default)]
    pub subagents: Vec<SubagentExecution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_iteration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentExecutionState {
    pub fn phase(&self, id: &str) -> Option<&PhaseExecution> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn subagent(&self, id: &str) -> Option<&SubagentExecution> {
        self.subagents.iter().find(|s| s.id == id)
    }
}
