//! Request building, model stepping and function dispatch for LLM agents.

pub mod contents;
pub mod functions;
pub mod instructions;
pub mod llm_flow;

pub use contents::build_contents;
pub use functions::{
    generate_client_function_call_id, handle_function_calls_async, tool_map, ToolMap,
    CLIENT_FUNCTION_CALL_ID_PREFIX,
};
pub use instructions::inject_session_state;
