//! Browser actions exposed to the agents as callable tools.

pub mod action;
pub mod outcome;

pub use outcome::{ToolErrorKind, ToolOutcome};

use crate::browser::BrowserDriver;
use crate::error::Result;
use crate::state::SessionState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The four browser actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    NavigateTo,
    ClickElement,
    SearchText,
    TakeScreenshot,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::NavigateTo,
        ToolKind::ClickElement,
        ToolKind::SearchText,
        ToolKind::TakeScreenshot,
    ];

    /// Name the model uses to call the tool
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::NavigateTo => "navigate_to",
            ToolKind::ClickElement => "click_element",
            ToolKind::SearchText => "search_text",
            ToolKind::TakeScreenshot => "take_screenshot",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::NavigateTo => "Navigate to a specific URL.",
            ToolKind::ClickElement => "Click an element with specific text.",
            ToolKind::SearchText => "Search for text on the current page.",
            ToolKind::TakeScreenshot => "Take a screenshot of the current page.",
        }
    }

    /// JSON schema of the tool's arguments
    pub fn parameters(&self) -> Value {
        match self {
            ToolKind::NavigateTo => json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "Absolute URL to open" }
                },
                "required": ["url"]
            }),
            ToolKind::ClickElement => json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Visible text of the element" },
                    "element_type": {
                        "type": "string",
                        "description": "\"link\" to click a link, anything else clicks any clickable element",
                        "default": "button"
                    }
                },
                "required": ["text"]
            }),
            ToolKind::SearchText => json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to look for" },
                    "nth_result": {
                        "type": "integer",
                        "description": "Which match to scroll to, starting at 1",
                        "default": 1,
                        "minimum": 1
                    }
                },
                "required": ["text"]
            }),
            ToolKind::TakeScreenshot => json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    /// OpenAI function-tool definition
    pub fn schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters()
            }
        })
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Deserialize)]
struct NavigateArgs {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ClickArgs {
    text: String,
    #[serde(default = "default_element_type")]
    element_type: String,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    text: String,
    #[serde(default = "default_nth_result")]
    nth_result: i64,
}

fn default_element_type() -> String {
    "button".to_string()
}

fn default_nth_result() -> i64 {
    1
}

/// Run a tool with JSON arguments from the model.
///
/// Arguments that do not fit the tool's parameters are reported as an
/// `InvalidArguments` outcome so the model can correct itself.
pub async fn dispatch(
    kind: ToolKind,
    arguments: &Value,
    browser: &dyn BrowserDriver,
    state: &mut SessionState,
) -> Result<ToolOutcome> {
    tracing::info!(tool = kind.name(), %arguments, "Dispatching tool");

    match kind {
        ToolKind::NavigateTo => match parse_args::<NavigateArgs>(kind, arguments) {
            Ok(args) => action::navigate_to(browser, state, &args.url).await,
            Err(outcome) => Ok(outcome),
        },
        ToolKind::ClickElement => match parse_args::<ClickArgs>(kind, arguments) {
            Ok(args) => Ok(
                action::click_element(browser, state, &args.text, &args.element_type).await,
            ),
            Err(outcome) => Ok(outcome),
        },
        ToolKind::SearchText => match parse_args::<SearchArgs>(kind, arguments) {
            Ok(args) => action::search_text(browser, &args.text, args.nth_result).await,
            Err(outcome) => Ok(outcome),
        },
        ToolKind::TakeScreenshot => action::take_screenshot(browser, state).await,
    }
}

fn parse_args<T: DeserializeOwned>(
    kind: ToolKind,
    arguments: &Value,
) -> std::result::Result<T, ToolOutcome> {
    // Models sometimes send `null` for a tool without parameters
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments.clone()
    };
    serde_json::from_value(arguments).map_err(|e| {
        ToolOutcome::failure(
            ToolErrorKind::InvalidArguments,
            format!("Invalid arguments for {}: {}", kind.name(), e),
        )
    })
}
