//! Model requests, responses and the backend trait.

pub mod llm;

pub use llm::{Llm, LlmRequest, LlmResponse, LlmResponseStream, ToolDeclaration};
