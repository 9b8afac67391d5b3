//! Prints workflow progress to a terminal.

use crate::workflow::WorkflowEvent;
use std::io::{self, Write};

const RULE_WIDTH: usize = 50;

/// Banner shown whenever a different agent becomes active
pub fn agent_banner(name: &str) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    format!("\n{}\n🤖 Agent: {}\n{}\n", rule, name, rule)
}

/// Writes one line (or banner) per event, remembering the last agent seen.
pub struct EventPrinter<W: Write> {
    out: W,
    current_agent: Option<String>,
}

impl<W: Write> EventPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            current_agent: None,
        }
    }

    pub fn current_agent(&self) -> Option<&str> {
        self.current_agent.as_deref()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn handle(&mut self, event: &WorkflowEvent) -> io::Result<()> {
        let name = event.current_agent_name();
        if self.current_agent.as_deref() != Some(name) {
            self.current_agent = Some(name.to_string());
            writeln!(self.out, "{}", agent_banner(name))?;
        }

        match event {
            // Covered by the banner
            WorkflowEvent::AgentChanged { .. } => {}
            WorkflowEvent::ToolCallRequested {
                tool_name,
                arguments,
                ..
            } => {
                writeln!(self.out, "🛠️  Calling {}({})", tool_name, arguments)?;
            }
            WorkflowEvent::ToolCallResult {
                tool_name, outcome, ..
            } => {
                let marker = if outcome.is_ok() { "" } else { "❌ " };
                writeln!(self.out, "🔧 {} → {}{}", tool_name, marker, outcome.message())?;
            }
            WorkflowEvent::OutputChunk { text, .. } => {
                writeln!(self.out, "{}", text)?;
            }
        }

        self.out.flush()
    }
}
