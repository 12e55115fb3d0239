//! Error classification shared by the runner and tool dispatch.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Broad error category; its snake_case name is the `error_code` written
/// onto error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    NotFound,
    Conflict,
    Configuration,
    Serialization,
    InvalidArgument,
    ToolExecution,
    Model,
    Callback,
    LimitExceeded,
    Unsupported,
    Internal,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckConfiguration,
    CheckToolImplementation,
    CreateSessionFirst,
    FixAgentTree,
    None,
}
