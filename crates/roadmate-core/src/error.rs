use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Duplicate tool name: {0}")]
    DuplicateToolName(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool_name}: {message}")]
    ToolValidation { tool_name: String, message: String },

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Malformed model response: {0}")]
    ModelResponseMalformed(String),

    #[error("Tool cycle limit exceeded after {0} cycles")]
    ToolCycleLimitExceeded(usize),

    #[error("Concurrent access to session {0}")]
    SessionConcurrencyConflict(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cancelled by client")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    /// Short machine-readable name, recorded in failure notices and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Config(_) => "config",
            Self::DuplicateToolName(_) => "duplicate_tool_name",
            Self::UnknownTool(_) => "unknown_tool",
            Self::ToolValidation { .. } => "tool_validation",
            Self::ToolExecution { .. } => "tool_execution",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::ModelResponseMalformed(_) => "model_response_malformed",
            Self::ToolCycleLimitExceeded(_) => "tool_cycle_limit_exceeded",
            Self::SessionConcurrencyConflict(_) => "session_concurrency_conflict",
            Self::Session(_) => "session",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::Cancelled => "cancelled",
            Self::Other(_) => "other",
        }
    }

    pub fn tool_execution(tool_name: &str, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(AgentError::ModelUnavailable("x".into()).kind(), "model_unavailable");
        assert_eq!(AgentError::ToolCycleLimitExceeded(8).kind(), "tool_cycle_limit_exceeded");
        assert_eq!(AgentError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn test_display_includes_tool_name() {
        let err = AgentError::tool_execution("place_order", "Unknown restaurant type: sushi");
        assert_eq!(
            err.to_string(),
            "Tool execution error: place_order: Unknown restaurant type: sushi"
        );
    }
}
