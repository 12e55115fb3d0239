//! Convenience re-exports for common use.

pub use crate::agents::{
    after_model_callback, after_tool_callback, agent_callback, before_model_callback,
    before_tool_callback, run_agent, Agent, AgentCallbacks, AgentKind, AgentTree,
    CallbackContext, EventStream, IncludeContents, InvocationContext, LlmAgent, LoopAgent,
    ParallelAgent, SequentialAgent,
};
pub use crate::config::{ArborConfig, RunConfig, StreamingMode};
pub use crate::error::{ArborError, Result};
pub use crate::events::{Event, EventActions, USER_AUTHOR};
pub use crate::models::{Llm, LlmRequest, LlmResponse, LlmResponseStream};
pub use crate::runner::Runner;
pub use crate::sessions::{
    GetSessionConfig, InMemorySessionService, Session, SessionService, State, StateMap,
};
pub use crate::tools::{FunctionTool, ParameterBuilder, Tool, ToolArguments, ToolContext, ToolParameters};
pub use crate::types::{Content, FunctionCall, FunctionResponse, Part, Role};
pub use futures::StreamExt;
