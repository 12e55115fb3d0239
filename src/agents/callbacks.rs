//! Hook types and the context handed to them.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;

use super::context::InvocationContext;
use crate::error::Result;
use crate::events::EventActions;
use crate::models::{LlmRequest, LlmResponse};
use crate::tools::ToolContext;
use crate::types::{Content, FunctionCall};

/// Runs before or after an agent. Returning content ends the agent with
/// that content as its reply.
pub type AgentCallback =
    Arc<dyn Fn(CallbackContext) -> BoxFuture<'static, Result<Option<Content>>> + Send + Sync>;

/// Runs before the model call. Returning a response skips the model.
pub type BeforeModelCallback = Arc<
    dyn Fn(CallbackContext, LlmRequest) -> BoxFuture<'static, Result<Option<LlmResponse>>>
        + Send
        + Sync,
>;

/// Runs on each model response. Returning a response replaces it.
pub type AfterModelCallback = Arc<
    dyn Fn(CallbackContext, LlmResponse) -> BoxFuture<'static, Result<Option<LlmResponse>>>
        + Send
        + Sync,
>;

/// Runs before a tool. Returning a value skips the tool and becomes its result.
pub type BeforeToolCallback = Arc<
    dyn Fn(FunctionCall, ToolContext) -> BoxFuture<'static, Result<Option<serde_json::Value>>>
        + Send
        + Sync,
>;

/// Runs after a tool with its result. Returning a value replaces the result.
pub type AfterToolCallback = Arc<
    dyn Fn(
            FunctionCall,
            ToolContext,
            serde_json::Value,
        ) -> BoxFuture<'static, Result<Option<serde_json::Value>>>
        + Send
        + Sync,
>;

/// Wrap a closure as an [`AgentCallback`].
pub fn agent_callback<F, Fut>(f: F) -> AgentCallback
where
    F: Fn(CallbackContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Content>>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Wrap a closure as a [`BeforeModelCallback`].
pub fn before_model_callback<F, Fut>(f: F) -> BeforeModelCallback
where
    F: Fn(CallbackContext, LlmRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<LlmResponse>>> + Send + 'static,
{
    Arc::new(move |ctx, request| Box::pin(f(ctx, request)))
}

/// Wrap a closure as an [`AfterModelCallback`].
pub fn after_model_callback<F, Fut>(f: F) -> AfterModelCallback
where
    F: Fn(CallbackContext, LlmResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<LlmResponse>>> + Send + 'static,
{
    Arc::new(move |ctx, response| Box::pin(f(ctx, response)))
}

/// Wrap a closure as a [`BeforeToolCallback`].
pub fn before_tool_callback<F, Fut>(f: F) -> BeforeToolCallback
where
    F: Fn(FunctionCall, ToolContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<serde_json::Value>>> + Send + 'static,
{
    Arc::new(move |call, ctx| Box::pin(f(call, ctx)))
}

/// Wrap a closure as an [`AfterToolCallback`].
pub fn after_tool_callback<F, Fut>(f: F) -> AfterToolCallback
where
    F: Fn(FunctionCall, ToolContext, serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<serde_json::Value>>> + Send + 'static,
{
    Arc::new(move |call, ctx, result| Box::pin(f(call, ctx, result)))
}

/// Before/after hooks every agent variant carries.
#[derive(Clone, Default)]
pub struct AgentCallbacks {
    pub before_agent: Vec<AgentCallback>,
    pub after_agent: Vec<AgentCallback>,
}

impl std::fmt::Debug for AgentCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCallbacks")
            .field("before_agent", &self.before_agent.len())
            .field("after_agent", &self.after_agent.len())
            .finish()
    }
}

/// What a hook sees: the invocation plus an action recorder. State written
/// here is committed with the event the hook's outcome produces.
#[derive(Clone)]
pub struct CallbackContext {
    invocation: InvocationContext,
    actions: Arc<Mutex<EventActions>>,
}

impl CallbackContext {
    pub fn new(invocation: InvocationContext) -> Self {
        Self {
            invocation,
            actions: Arc::new(Mutex::new(EventActions::default())),
        }
    }

    pub fn invocation(&self) -> &InvocationContext {
        &self.invocation
    }

    pub fn agent_name(&self) -> &str {
        self.invocation.agent_name()
    }

    pub fn invocation_id(&self) -> &str {
        self.invocation.invocation_id()
    }

    pub fn user_content(&self) -> Option<&Content> {
        self.invocation.user_content()
    }

    /// Read a state value, seeing this context's own uncommitted writes.
    pub async fn state(&self, key: &str) -> Option<serde_json::Value> {
        let pending = self.with_actions(|actions| actions.state_delta.get(key).cloned());
        match pending {
            Some(value) => Some(value),
            None => self.invocation.state_value(key).await,
        }
    }

    pub fn set_state(&self, key: impl Into<String>, value: serde_json::Value) {
        self.with_actions(|actions| {
            actions.state_delta.insert(key.into(), value);
        });
    }

    /// Snapshot of the recorded actions.
    pub fn actions(&self) -> EventActions {
        self.with_actions(|actions| actions.clone())
    }

    pub fn has_state_delta(&self) -> bool {
        self.with_actions(|actions| !actions.state_delta.is_empty())
    }

    pub(crate) fn with_actions<T>(&self, f: impl FnOnce(&mut EventActions) -> T) -> T {
        let mut actions = self.actions.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut actions)
    }
}

impl std::fmt::Debug for CallbackContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackContext")
            .field("agent", &self.agent_name())
            .field("invocation_id", &self.invocation_id())
            .finish()
    }
}
