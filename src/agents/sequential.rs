//! Runs sub-agents one after another on the same branch.

use std::sync::Arc;

use async_stream::try_stream;
use futures::StreamExt;

use super::callbacks::{AgentCallback, AgentCallbacks};
use super::context::InvocationContext;
use super::{on_own_branch, run_agent, run_agent_live, Agent, AgentKind, EventStream};

#[derive(Debug, Default)]
pub struct SequentialAgent {
    name: String,
    description: String,
    sub_agents: Vec<Arc<dyn Agent>>,
    callbacks: AgentCallbacks,
}

impl SequentialAgent {
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

impl Agent for SequentialAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Sequential
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.sub_agents
    }

    fn callbacks(&self) -> &AgentCallbacks {
        &self.callbacks
    }

    /// Stops at the first escalating event. An escalation raised inside a
    /// parallel branch lets the remaining branches finish first.
    fn run_impl(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        Box::pin(try_stream! {
            for sub_agent in self.sub_agents.iter() {
                let mut events = run_agent(sub_agent.clone(), &ctx);
                let mut escalated = false;
                while let Some(event) = events.next().await {
                    let event = event?;
                    let escalate = event.actions.escalate;
                    let on_branch = on_own_branch(&event, &ctx);
                    yield event;
                    if escalate {
                        escalated = true;
                        if on_branch {
                            break;
                        }
                    }
                }
                if escalated {
                    tracing::debug!(
                        agent = %self.name,
                        escalated_by = %sub_agent.name(),
                        "sequence ended by escalation"
                    );
                    return;
                }
            }
        })
    }

    fn run_live_impl(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        Box::pin(try_stream! {
            for sub_agent in self.sub_agents.iter() {
                let mut events = run_agent_live(sub_agent.clone(), &ctx);
                while let Some(event) = events.next().await {
                    yield event?;
                }
            }
        })
    }
}
