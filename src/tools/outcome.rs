use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why a tool reported failure instead of succeeding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// The page refused or could not perform an interaction
    Interaction,
    /// The requested match does not exist
    NotFound,
    /// The model asked for a tool this agent does not have
    UnknownTool,
    /// The arguments did not match the tool's parameters
    InvalidArguments,
    /// The requested hand-off target is not a declared peer
    HandoffRejected,
    /// The call was not executed because control moved to another agent
    Skipped,
}

/// Result of one tool invocation, fed back to the model as text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    Error {
        kind: ToolErrorKind,
        message: String,
    },
}

impl ToolOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        ToolOutcome::Ok {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(message: impl Into<String>, data: Value) -> Self {
        ToolOutcome::Ok {
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        ToolOutcome::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOutcome::Ok { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            ToolOutcome::Ok { message, .. } | ToolOutcome::Error { message, .. } => message,
        }
    }

    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        match self {
            ToolOutcome::Ok { .. } => None,
            ToolOutcome::Error { kind, .. } => Some(*kind),
        }
    }

    /// Text sent back to the model as the tool message
    pub fn to_model_content(&self) -> String {
        self.message().to_string()
    }
}
