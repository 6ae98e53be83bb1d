//! Error types for context-bundler

use std::any::Any;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors surfaced by the library's management and collaborator APIs.
///
/// Selection and context optimization never return these to their callers;
/// they degrade to empty or fallback results instead.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Bundle not found: {0}")]
    BundleNotFound(String),

    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("Tool error: {0}")]
    Tool(#[from] crate::tools::ToolError),

    #[error("LLM error: {provider} - {message}")]
    Llm { provider: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ContextError {
    /// Create an LLM provider error.
    pub fn llm(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Llm {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Text of a caught panic payload, when it carries one
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
}

impl From<config::ConfigError> for ContextError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}
