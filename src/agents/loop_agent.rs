//! Re-runs its sub-agent sequence until escalation or an iteration cap.

use std::sync::Arc;

use async_stream::try_stream;
use futures::StreamExt;

use super::callbacks::{AgentCallback, AgentCallbacks};
use super::context::InvocationContext;
use super::{on_own_branch, run_agent, unsupported_stream, Agent, AgentKind, EventStream};

#[derive(Debug, Default)]
pub struct LoopAgent {
    name: String,
    description: String,
    sub_agents: Vec<Arc<dyn Agent>>,
    /// `None` or zero loops until a sub-agent escalates.
    max_iterations: Option<u32>,
    callbacks: AgentCallbacks,
}

impl LoopAgent {
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

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
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

    pub fn max_iterations(&self) -> Option<u32> {
        self.max_iterations.filter(|max| *max > 0)
    }
}

impl Agent for LoopAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Loop
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.sub_agents
    }

    fn callbacks(&self) -> &AgentCallbacks {
        &self.callbacks
    }

    fn run_impl(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        Box::pin(try_stream! {
            if self.sub_agents.is_empty() {
                return;
            }
            let max_iterations = self.max_iterations();
            let mut iteration: u32 = 0;

            while max_iterations.map_or(true, |max| iteration < max) {
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
                        tracing::debug!(agent = %self.name, iteration, "loop ended by escalation");
                        return;
                    }
                }
                iteration += 1;
            }
        })
    }

    fn run_live_impl(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        unsupported_stream(format!("live run is not supported by loop agent '{}'", ctx.agent_name()))
    }
}
