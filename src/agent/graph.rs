use crate::agent::descriptor::{analysis_agent, browser_agent, AgentDescriptor, BROWSER_AGENT};
use crate::error::{DuetError, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Name of the pseudo-tool the model calls to transfer control
pub const HANDOFF_TOOL: &str = "handoff";

/// Validated set of agents with a designated entry point
#[derive(Debug, Clone)]
pub struct AgentGraph {
    agents: BTreeMap<String, AgentDescriptor>,
    root: String,
}

impl AgentGraph {
    /// Build a graph, rejecting duplicate names, self-loops, hand-off targets
    /// that name no agent, and an unknown root.
    pub fn new(agents: Vec<AgentDescriptor>, root: &str) -> Result<Self> {
        let mut by_name = BTreeMap::new();
        for agent in agents {
            let name = agent.name().to_string();
            if name.trim().is_empty() {
                return Err(DuetError::Validation("Agent name cannot be empty".to_string()));
            }
            if by_name.insert(name.clone(), agent).is_some() {
                return Err(DuetError::Validation(format!(
                    "Duplicate agent name: {}",
                    name
                )));
            }
        }

        for agent in by_name.values() {
            for target in agent.handoff_targets() {
                if target == agent.name() {
                    return Err(DuetError::Validation(format!(
                        "Agent {} cannot hand off to itself",
                        target
                    )));
                }
                if !by_name.contains_key(target) {
                    return Err(DuetError::Validation(format!(
                        "Agent {} hands off to unknown agent {}",
                        agent.name(),
                        target
                    )));
                }
            }
        }

        if !by_name.contains_key(root) {
            return Err(DuetError::Validation(format!("Unknown root agent: {}", root)));
        }

        Ok(Self {
            agents: by_name,
            root: root.to_string(),
        })
    }

    /// BrowserAgent and AnalysisAgent, rooted at BrowserAgent
    pub fn browsing_pair() -> Result<Self> {
        Self::new(vec![browser_agent(), analysis_agent()], BROWSER_AGENT)
    }

    pub fn root(&self) -> &AgentDescriptor {
        // Presence checked in `new`
        &self.agents[&self.root]
    }

    pub fn get(&self, name: &str) -> Option<&AgentDescriptor> {
        self.agents.get(name)
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.values()
    }

    pub fn can_handoff(&self, from: &str, to: &str) -> bool {
        self.agents
            .get(from)
            .map(|agent| agent.handoff_targets().contains(to))
            .unwrap_or(false)
    }

    /// Function schemas offered to `agent`: its own tools plus `handoff`
    /// restricted to its declared peers.
    pub fn tool_schemas(&self, agent: &AgentDescriptor) -> Vec<Value> {
        let mut schemas: Vec<Value> = agent.tools().iter().map(|kind| kind.schema()).collect();
        if let Some(handoff) = self.handoff_schema(agent) {
            schemas.push(handoff);
        }
        schemas
    }

    fn handoff_schema(&self, agent: &AgentDescriptor) -> Option<Value> {
        if agent.handoff_targets().is_empty() {
            return None;
        }

        let peers: Vec<String> = agent
            .handoff_targets()
            .iter()
            .filter_map(|name| self.agents.get(name))
            .map(|peer| format!("{}: {}", peer.name(), peer.description()))
            .collect();
        let targets: Vec<&String> = agent.handoff_targets().iter().collect();

        Some(json!({
            "type": "function",
            "function": {
                "name": HANDOFF_TOOL,
                "description": format!(
                    "Hand control to another agent when it is better suited to continue. Available agents: {}",
                    peers.join("; ")
                ),
                "parameters": {
                    "type": "object",
                    "properties": {
                        "to_agent": {
                            "type": "string",
                            "enum": targets,
                            "description": "Name of the agent to hand off to"
                        },
                        "reason": {
                            "type": "string",
                            "description": "Why the other agent should take over"
                        }
                    },
                    "required": ["to_agent", "reason"]
                }
            }
        }))
    }

    /// System prompt for `agent`, extended with the hand-off instructions
    pub fn system_prompt(&self, agent: &AgentDescriptor) -> String {
        if agent.handoff_targets().is_empty() {
            return agent.system_prompt().to_string();
        }
        let peers: Vec<&str> = agent.handoff_targets().iter().map(String::as_str).collect();
        format!(
            "{}\n\nYou are {}. If another agent is better suited for the next step, call the `{}` tool with one of: {}. \
             When the task is complete, reply with your answer and no tool calls.",
            agent.system_prompt(),
            agent.name(),
            HANDOFF_TOOL,
            peers.join(", ")
        )
    }
}
