//! Tool system for function calling.

pub mod arguments;
pub mod context;
pub mod tool;
pub mod transfer;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use context::ToolContext;
pub use tool::{FunctionTool, Tool};
pub use transfer::{TransferToAgentTool, TRANSFER_TO_AGENT};
pub use types::{ParameterBuilder, ToolParameters};
pub use validation::{validate_arguments, ArgumentViolation};
