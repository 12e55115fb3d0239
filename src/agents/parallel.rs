//! Runs sub-agents concurrently, each on its own branch.

use std::sync::Arc;

use async_stream::try_stream;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;

use super::callbacks::{AgentCallback, AgentCallbacks};
use super::context::InvocationContext;
use super::{run_agent, unsupported_stream, Agent, AgentKind, EventStream};
use crate::error::{ArborError, Result};
use crate::events::Event;

/// An event from one branch plus the acknowledgement the branch waits for
/// before producing its next event.
type BranchItem = (Result<Event>, oneshot::Sender<()>);

#[derive(Debug, Default)]
pub struct ParallelAgent {
    name: String,
    description: String,
    sub_agents: Vec<Arc<dyn Agent>>,
    callbacks: AgentCallbacks,
}

impl ParallelAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_sub_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.sub_agents.push(agent);
        self
    }

    pub fn with_sub_agents(mut self, agents: impl IntoIterator<Item = Arc<dyn Agent>>) -> Self {
        self.sub_agents.extend(agents);
        self
    }

    pub fn with_before_agent_callback(mut self, callback: AgentCallback) -> Self {
        self.callbacks.before_agent.push(callback);
        self
    }

    pub fn with_after_agent_callback(mut self, callback: AgentCallback) -> Self {
        self.callbacks.after_agent.push(callback);
        self
    }
}

/// `{parent}.{parallel}.{sub}`, or `{parallel}.{sub}` at the top level.
pub fn branch_for(parent_branch: Option<&str>, parallel_name: &str, sub_agent_name: &str) -> String {
    match parent_branch {
        Some(parent) if !parent.is_empty() => {
            format!("{parent}.{parallel_name}.{sub_agent_name}")
        }
        _ => format!("{parallel_name}.{sub_agent_name}"),
    }
}

impl Agent for ParallelAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Parallel
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.sub_agents
    }

    fn callbacks(&self) -> &AgentCallbacks {
        &self.callbacks
    }

    /// Events are merged in the order branches produce them. Each branch
    /// waits until its previous event has been consumed downstream, so the
    /// runner commits it before the branch continues. Escalation in one
    /// branch does not stop the others.
    fn run_impl(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        Box::pin(try_stream! {
            let (tx, rx) = mpsc::channel::<BranchItem>(ctx.run_config().event_buffer.max(1));
            let mut branches = JoinSet::new();

            for sub_agent in self.sub_agents.iter() {
                let branch = branch_for(ctx.branch(), &self.name, sub_agent.name());
                let branch_ctx = ctx.clone().with_branch(Some(branch.clone()));
                let mut events = run_agent(sub_agent.clone(), &branch_ctx);
                let tx = tx.clone();

                branches.spawn(async move {
                    while let Some(item) = events.next().await {
                        let failed = item.is_err();
                        let (ack_tx, ack_rx) = oneshot::channel();
                        if tx.send((item, ack_tx)).await.is_err() {
                            break;
                        }
                        if failed || ack_rx.await.is_err() {
                            break;
                        }
                    }
                    tracing::debug!(branch = %branch, "parallel branch finished");
                });
            }
            drop(tx);

            let mut merged = ReceiverStream::new(rx);
            while let Some((item, ack)) = merged.next().await {
                let event = item?;
                yield event;
                let _ = ack.send(());
            }
            while let Some(joined) = branches.join_next().await {
                if let Err(err) = joined {
                    if err.is_panic() {
                        Err::<(), _>(ArborError::InvalidState(format!(
                            "a branch of parallel agent '{}' panicked",
                            self.name
                        )))?;
                    }
                }
            }
        })
    }

    fn run_live_impl(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        unsupported_stream(format!(
            "live run is not supported by parallel agent '{}'",
            ctx.agent_name()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_nests_under_parent() {
        assert_eq!(branch_for(None, "par", "x"), "par.x");
        assert_eq!(branch_for(Some(""), "par", "x"), "par.x");
        assert_eq!(branch_for(Some("outer.p0"), "par", "x"), "outer.p0.par.x");
    }
}
