use crate::tools::ToolKind;
use std::collections::BTreeSet;

pub const BROWSER_AGENT: &str = "BrowserAgent";
pub const ANALYSIS_AGENT: &str = "AnalysisAgent";

/// Declarative description of one agent: who it is, what it may call and
/// whom it may hand control to.
///
/// Built with the consuming `with_*` methods, then frozen inside an
/// [`AgentGraph`](super::graph::AgentGraph).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDescriptor {
    name: String,
    description: String,
    system_prompt: String,
    tools: BTreeSet<ToolKind>,
    handoff_targets: BTreeSet<String>,
}

impl AgentDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            tools: BTreeSet::new(),
            handoff_targets: BTreeSet::new(),
        }
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = ToolKind>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_handoff(mut self, target: impl Into<String>) -> Self {
        self.handoff_targets.insert(target.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &BTreeSet<ToolKind> {
        &self.tools
    }

    pub fn handoff_targets(&self) -> &BTreeSet<String> {
        &self.handoff_targets
    }

    pub fn has_tool(&self, kind: ToolKind) -> bool {
        self.tools.contains(&kind)
    }
}

/// Drives the browser: all four tools, hands off to the analyst
pub fn browser_agent() -> AgentDescriptor {
    AgentDescriptor::new(
        BROWSER_AGENT,
        "Agent capable of web browsing and interaction",
        "You are a web browsing agent that can navigate websites, click elements, \
         and search for text on pages. You can also take screenshots of the current page.",
    )
    .with_tools(ToolKind::ALL)
    .with_handoff(ANALYSIS_AGENT)
}

/// Reads what the browser agent found
pub fn analysis_agent() -> AgentDescriptor {
    AgentDescriptor::new(
        ANALYSIS_AGENT,
        "Agent for analyzing web content and screenshots",
        "You analyze web content and screenshots to extract relevant information \
         and provide insights based on the browsing results.",
    )
    .with_tools([ToolKind::SearchText, ToolKind::TakeScreenshot])
    .with_handoff(BROWSER_AGENT)
}
