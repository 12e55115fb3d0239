//! Error types for arbor.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all arbor operations.
#[derive(Error, Debug)]
pub enum ArborError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session not found: {app_name}/{user_id}/{session_id}")]
    SessionNotFound {
        app_name: String,
        user_id: String,
        session_id: String,
    },

    #[error("Session already exists: {app_name}/{user_id}/{session_id}")]
    SessionAlreadyExists {
        app_name: String,
        user_id: String,
        session_id: String,
    },

    #[error("Agent not found in tree: {0}")]
    AgentNotFound(String),

    #[error("Malformed agent tree: {0}")]
    MalformedTree(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Callback {hook} failed: {message}")]
    Callback { hook: String, message: String },

    #[error("Max number of LLM calls ({0}) exceeded")]
    LlmCallsLimitExceeded(u32),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ArborError {
    pub fn session_not_found(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self::SessionNotFound {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create a callback failure.
    pub fn callback(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Callback {
            hook: hook.into(),
            message: message.into(),
        }
    }

    /// Attribute a failure raised inside `hook`. Errors that already name
    /// a hook pass through unchanged.
    pub fn in_hook(hook: &str, err: ArborError) -> Self {
        match err {
            Self::Callback { .. } => err,
            other => Self::callback(hook, other.to_string()),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SessionNotFound { .. } | Self::AgentNotFound(_) => ErrorCategory::NotFound,
            Self::SessionAlreadyExists { .. } => ErrorCategory::Conflict,
            Self::Configuration(_) | Self::MalformedTree(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::InvalidArgument(_) => ErrorCategory::InvalidArgument,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Model(_) => ErrorCategory::Model,
            Self::Callback { .. } => ErrorCategory::Callback,
            Self::LlmCallsLimitExceeded(_) => ErrorCategory::LimitExceeded,
            Self::Unsupported(_) => ErrorCategory::Unsupported,
            Self::InvalidState(_) => ErrorCategory::Internal,
        }
    }

    /// Machine-readable code recorded on error events.
    pub fn error_code(&self) -> String {
        self.category().to_string()
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Model)
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            Self::SessionNotFound { .. } => RecoverySuggestion::CreateSessionFirst,
            Self::MalformedTree(_) | Self::AgentNotFound(_) => RecoverySuggestion::FixAgentTree,
            Self::Model(_) => RecoverySuggestion::RetryWithBackoff,
            Self::Configuration(_) => RecoverySuggestion::CheckConfiguration,
            Self::ToolExecution { .. } => RecoverySuggestion::CheckToolImplementation,
            _ => RecoverySuggestion::None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ArborError>;
