//! Agents: the nodes of the execution tree.

pub mod callbacks;
pub mod context;
pub mod llm_agent;
pub mod loop_agent;
pub mod parallel;
pub mod sequential;
pub mod tree;

pub use callbacks::{
    after_model_callback, after_tool_callback, agent_callback, before_model_callback,
    before_tool_callback, AfterModelCallback, AfterToolCallback, AgentCallback, AgentCallbacks,
    BeforeModelCallback, BeforeToolCallback, CallbackContext,
};
pub use context::{InvocationContext, SessionHandle};
pub use llm_agent::{IncludeContents, LlmAgent};
pub use loop_agent::LoopAgent;
pub use parallel::ParallelAgent;
pub use sequential::SequentialAgent;
pub use tree::AgentTree;

use std::sync::Arc;

use async_stream::try_stream;
use futures::stream::{self, BoxStream, StreamExt};
use strum::Display;

use crate::error::{ArborError, Result};
use crate::events::Event;

/// Lazy sequence of events produced by one agent run.
pub type EventStream = BoxStream<'static, Result<Event>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AgentKind {
    Llm,
    Sequential,
    Parallel,
    Loop,
    Custom,
}

/// A node in the agent tree.
///
/// Implementors provide `run_impl`; callers go through [`run_agent`],
/// which derives the child context and runs the agent hooks around it.
pub trait Agent: Send + Sync {
    /// Unique within the tree.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Custom
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &[]
    }

    fn callbacks(&self) -> &AgentCallbacks;

    fn as_llm_agent(&self) -> Option<&LlmAgent> {
        None
    }

    /// Produce this agent's events. `ctx.agent()` is this agent.
    fn run_impl(self: Arc<Self>, ctx: InvocationContext) -> EventStream;

    /// Streaming-session variant of [`Agent::run_impl`].
    fn run_live_impl(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        unsupported_stream(format!("live run is not supported by agent '{}'", ctx.agent_name()))
    }
}

impl std::fmt::Debug for dyn Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

pub(crate) fn unsupported_stream(message: String) -> EventStream {
    Box::pin(stream::once(async move { Err(ArborError::Unsupported(message)) }))
}

/// Whether `event` was produced on `ctx`'s own branch. Events from deeper
/// branches come from parallel runs whose sibling branches must be allowed
/// to finish.
pub(crate) fn on_own_branch(event: &Event, ctx: &InvocationContext) -> bool {
    event.branch.as_deref() == ctx.branch()
}

/// Run `agent` beneath `parent`: before-agent hooks, the agent itself,
/// then after-agent hooks.
pub fn run_agent(agent: Arc<dyn Agent>, parent: &InvocationContext) -> EventStream {
    let ctx = parent.for_agent(agent.clone());
    Box::pin(try_stream! {
        tracing::debug!(
            invocation_id = %ctx.invocation_id(),
            agent = %agent.name(),
            kind = %agent.kind(),
            branch = ?ctx.branch(),
            "agent started"
        );

        if let Some(event) = handle_before_agent(&agent, &ctx).await? {
            yield event;
        }
        if ctx.is_ended() {
            return;
        }

        let mut events = agent.clone().run_impl(ctx.clone());
        while let Some(event) = events.next().await {
            yield event?;
        }
        if ctx.is_ended() {
            return;
        }

        if let Some(event) = handle_after_agent(&agent, &ctx).await? {
            yield event;
        }
        tracing::debug!(invocation_id = %ctx.invocation_id(), agent = %agent.name(), "agent finished");
    })
}

/// Live counterpart of [`run_agent`].
pub fn run_agent_live(agent: Arc<dyn Agent>, parent: &InvocationContext) -> EventStream {
    let ctx = parent.for_agent(agent.clone());
    agent.run_live_impl(ctx)
}

async fn handle_before_agent(
    agent: &Arc<dyn Agent>,
    ctx: &InvocationContext,
) -> Result<Option<Event>> {
    let hooks = &agent.callbacks().before_agent;
    if hooks.is_empty() {
        return Ok(None);
    }

    let cb_ctx = CallbackContext::new(ctx.clone());
    for hook in hooks {
        let reply = hook(cb_ctx.clone())
            .await
            .map_err(|err| ArborError::in_hook("before_agent", err))?;
        if let Some(content) = reply {
            ctx.end_invocation();
            return Ok(Some(
                ctx.new_event()
                    .with_content(content)
                    .with_actions(cb_ctx.actions()),
            ));
        }
    }

    if cb_ctx.has_state_delta() {
        return Ok(Some(ctx.new_event().with_actions(cb_ctx.actions())));
    }
    Ok(None)
}

async fn handle_after_agent(
    agent: &Arc<dyn Agent>,
    ctx: &InvocationContext,
) -> Result<Option<Event>> {
    let hooks = &agent.callbacks().after_agent;
    if hooks.is_empty() {
        return Ok(None);
    }

    let cb_ctx = CallbackContext::new(ctx.clone());
    let mut content = None;
    for hook in hooks {
        let reply = hook(cb_ctx.clone())
            .await
            .map_err(|err| ArborError::in_hook("after_agent", err))?;
        if let Some(reply) = reply {
            content = Some(reply);
            break;
        }
    }

    match content {
        Some(content) => Ok(Some(
            ctx.new_event()
                .with_content(content)
                .with_actions(cb_ctx.actions()),
        )),
        None if cb_ctx.has_state_delta() => {
            Ok(Some(ctx.new_event().with_actions(cb_ctx.actions())))
        }
        None => Ok(None),
    }
}
