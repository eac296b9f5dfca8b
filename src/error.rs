//! Error taxonomy for the conversation loop.

use thiserror::Error;

/// Fault raised by a tool capability. Always carries plain text so it can be
/// handed back to the model as a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ToolExecutionError {
    pub message: String,
}

impl ToolExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ToolExecutionError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<anyhow::Error> for ToolExecutionError {
    fn from(e: anyhow::Error) -> Self {
        Self::new(format!("{e:#}"))
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    /// The model asked for a tool the registry does not hold.
    #[error("tool not found: '{name}'")]
    ToolNotFound { name: String },

    #[error("tool '{name}' failed: {source}")]
    ToolExecution {
        name: String,
        #[source]
        source: ToolExecutionError,
    },

    /// The model call itself failed. Not recoverable inside a run.
    #[error("model service error: {reason}")]
    ModelService { reason: String },

    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error("persistence error: {reason}")]
    Persistence { reason: String },

    #[error("configuration error: {reason}")]
    Config { reason: String },

    #[error("interrupted")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    pub fn model(reason: impl Into<String>) -> Self {
        Self::ModelService {
            reason: reason.into(),
        }
    }

    pub fn invalid_command(reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            reason: reason.into(),
        }
    }

    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Persistence {
            reason: e.to_string(),
        }
    }
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_messages_name_the_tool() {
        let missing = AgentError::ToolNotFound {
            name: "nonexistent_tool".to_string(),
        };
        assert_eq!(missing.to_string(), "tool not found: 'nonexistent_tool'");

        let failed = AgentError::ToolExecution {
            name: "run_bash".to_string(),
            source: ToolExecutionError::new("boom"),
        };
        assert_eq!(failed.to_string(), "tool 'run_bash' failed: boom");
    }

    #[test]
    fn test_json_errors_map_to_persistence() {
        let error: AgentError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(error, AgentError::Persistence { .. }));
    }
}
