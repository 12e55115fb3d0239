//! Entry point for running a conversation turn against an agent tree.

use std::sync::Arc;

use async_stream::try_stream;
use futures::StreamExt;

use crate::agents::{run_agent, Agent, AgentTree, EventStream, InvocationContext};
use crate::config::RunConfig;
use crate::error::{ArborError, Result};
use crate::events::{Event, USER_AUTHOR};
use crate::sessions::{Session, SessionService};
use crate::types::Content;

/// Runs user turns against an agent tree and commits every produced event
/// through the session service.
pub struct Runner {
    app_name: String,
    tree: Arc<AgentTree>,
    session_service: Arc<dyn SessionService>,
    run_config: RunConfig,
}

impl Runner {
    /// Fails with [`ArborError::MalformedTree`] when agent names are empty,
    /// reserved or not unique.
    pub fn new(
        app_name: impl Into<String>,
        root_agent: Arc<dyn Agent>,
        session_service: Arc<dyn SessionService>,
    ) -> Result<Self> {
        Ok(Self {
            app_name: app_name.into(),
            tree: Arc::new(AgentTree::new(root_agent)?),
            session_service,
            run_config: RunConfig::default(),
        })
    }

    pub fn with_run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = run_config;
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn root_agent(&self) -> &Arc<dyn Agent> {
        self.tree.root()
    }

    pub fn tree(&self) -> &Arc<AgentTree> {
        &self.tree
    }

    pub fn session_service(&self) -> &Arc<dyn SessionService> {
        &self.session_service
    }

    /// Run one user turn.
    ///
    /// The new message is committed first, then the agent resolved by
    /// [`Runner::find_agent_to_run`] runs. Every non-partial event is
    /// committed before the next one is produced. Failures inside the run
    /// become a final error event; only an unknown session fails the call.
    pub async fn run_async(
        &self,
        user_id: &str,
        session_id: &str,
        new_message: Content,
    ) -> Result<EventStream> {
        let session = self
            .session_service
            .get_session(&self.app_name, user_id, session_id, None)
            .await?
            .ok_or_else(|| ArborError::session_not_found(&self.app_name, user_id, session_id))?;

        let ctx = InvocationContext::new(
            self.tree.clone(),
            session,
            self.session_service.clone(),
            self.run_config.clone(),
        )
        .with_user_content(new_message.clone());
        let service = self.session_service.clone();
        let tree = self.tree.clone();

        tracing::debug!(
            app_name = %self.app_name,
            user_id,
            session_id,
            invocation_id = %ctx.invocation_id(),
            "starting invocation"
        );

        Ok(Box::pin(try_stream! {
            let user_event = Event::new(ctx.invocation_id(), USER_AUTHOR).with_content(new_message);
            {
                let mut session = ctx.session().write().await;
                service.append_event(&mut session, user_event).await?;
            }

            let agent = {
                let session = ctx.session().read().await;
                resolve_agent(&tree, &session)
            };
            let agent_name = agent.name().to_string();
            tracing::debug!(
                invocation_id = %ctx.invocation_id(),
                agent = %agent_name,
                "resolved agent to run"
            );

            let mut events = run_agent(agent, &ctx);
            while let Some(next) = events.next().await {
                match next {
                    Ok(event) if event.partial => {
                        yield event;
                    }
                    Ok(event) => {
                        let mut session = ctx.session().write().await;
                        let committed = service.append_event(&mut session, event).await?;
                        tracing::debug!(
                            invocation_id = %ctx.invocation_id(),
                            session_id = %session.id,
                            author = %committed.author,
                            event_id = %committed.id,
                            "event committed"
                        );
                        drop(session);
                        yield committed;
                    }
                    Err(err) => {
                        tracing::warn!(
                            invocation_id = %ctx.invocation_id(),
                            agent = %agent_name,
                            error = %err,
                            "invocation failed"
                        );
                        let mut event = Event::new(ctx.invocation_id(), agent_name.clone())
                            .with_error(err.error_code(), err.to_string());
                        event.interrupted = true;
                        let committed = {
                            let mut session = ctx.session().write().await;
                            service.append_event(&mut session, event).await?
                        };
                        yield committed;
                        break;
                    }
                }
            }
        }))
    }

    /// The agent that should handle the next turn of `session`.
    ///
    /// A trailing function response goes back to the agent that made the
    /// call. Otherwise the most recent author that is the root or can be
    /// resumed across the tree wins; the root is the fallback.
    pub fn find_agent_to_run(&self, session: &Session) -> Arc<dyn Agent> {
        resolve_agent(&self.tree, session)
    }

    pub fn is_transferable_across_agent_tree(&self, agent: &Arc<dyn Agent>) -> bool {
        self.tree.is_transferable_across_tree(agent.name())
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("app_name", &self.app_name)
            .field("tree", &self.tree)
            .field("run_config", &self.run_config)
            .finish()
    }
}

/// The event holding the call answered by the session's last event.
fn find_matching_function_call(events: &[Event]) -> Option<&Event> {
    let (last, earlier) = events.split_last()?;
    let response_id = &last.function_responses().first()?.id;
    earlier.iter().rev().find(|event| {
        event
            .function_calls()
            .iter()
            .any(|call| &call.id == response_id)
    })
}

fn resolve_agent(tree: &AgentTree, session: &Session) -> Arc<dyn Agent> {
    if let Some(call_event) = find_matching_function_call(&session.events) {
        if let Some(agent) = tree.find_agent(&call_event.author) {
            return agent.clone();
        }
    }

    for event in session.events.iter().rev() {
        if event.author == USER_AUTHOR {
            continue;
        }
        if tree.is_root(&event.author) {
            return tree.root().clone();
        }
        let Some(agent) = tree.find_agent(&event.author) else {
            tracing::warn!(
                session_id = %session.id,
                author = %event.author,
                "event author not found in agent tree"
            );
            continue;
        };
        if tree.is_transferable_across_tree(&event.author) {
            return agent.clone();
        }
    }
    tree.root().clone()
}
