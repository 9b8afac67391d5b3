//! Events emitted while a workflow runs, and its final output.

use crate::state::SessionState;
use crate::tools::ToolOutcome;
use serde::Serialize;
use serde_json::Value;

/// Progress notification from a running workflow.
///
/// Every variant carries the name of the agent that was active when it was
/// emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// Control moved to a new agent (also emitted once for the root agent)
    AgentChanged {
        current_agent_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ToolCallRequested {
        current_agent_name: String,
        tool_id: String,
        tool_name: String,
        arguments: Value,
    },
    ToolCallResult {
        current_agent_name: String,
        tool_id: String,
        tool_name: String,
        outcome: ToolOutcome,
    },
    /// Text the model produced alongside or instead of tool calls
    OutputChunk {
        current_agent_name: String,
        text: String,
    },
}

impl WorkflowEvent {
    pub fn current_agent_name(&self) -> &str {
        match self {
            WorkflowEvent::AgentChanged {
                current_agent_name, ..
            }
            | WorkflowEvent::ToolCallRequested {
                current_agent_name, ..
            }
            | WorkflowEvent::ToolCallResult {
                current_agent_name, ..
            }
            | WorkflowEvent::OutputChunk {
                current_agent_name, ..
            } => current_agent_name,
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    /// Final model reply (the one without tool calls)
    pub response: String,
    /// Agent that produced the final reply
    pub final_agent: String,
    pub state: SessionState,
    /// Model turns taken
    pub steps: u32,
}
