//! Agents: LLM client, agent descriptors and the hand-off graph.

pub mod descriptor;
pub mod graph;
pub mod llm;
pub mod types;

pub use descriptor::{analysis_agent, browser_agent, AgentDescriptor};
pub use graph::{AgentGraph, HANDOFF_TOOL};
pub use llm::{create_provider, LLMProvider, OpenAIProvider};
pub use types::*;
