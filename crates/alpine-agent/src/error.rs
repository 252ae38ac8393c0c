//! Error types for the agent crate.

use thiserror::Error;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Error type for agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// LLM backend error.
    #[error("LLM error: {0}")]
    Llm(#[from] alpine_llm::LlmError),

    /// Pipeline error surfaced by a tool.
    #[error("Advisor error: {0}")]
    Advisor(#[from] alpine_advisor::AdvisorError),

    /// Tool execution error.
    #[error("Tool error: {0}")]
    Tool(String),

    /// Tool not found in registry.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Arguments rejected by the tool's schema.
    #[error("Invalid tool parameters: {0}")]
    InvalidToolParams(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Turn was cancelled.
    #[error("Turn cancelled")]
    Cancelled,
}

impl AgentError {
    /// Create a tool error.
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }
}
