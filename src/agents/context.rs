//! Per-invocation context threaded through the agent tree.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::tree::AgentTree;
use super::Agent;
use crate::config::RunConfig;
use crate::error::{ArborError, Result};
use crate::events::Event;
use crate::sessions::{Session, SessionService};
use crate::types::Content;

/// The session an invocation works on, shared by every branch.
pub type SessionHandle = Arc<RwLock<Session>>;

/// State for one run of the agent tree, from one new user message to the
/// end of the resolved agent's event stream.
///
/// Cloning is cheap; clones share the session, the model call counter and
/// the end-invocation flag.
#[derive(Clone)]
pub struct InvocationContext {
    invocation_id: String,
    branch: Option<String>,
    agent: Arc<dyn Agent>,
    tree: Arc<AgentTree>,
    session: SessionHandle,
    session_service: Arc<dyn SessionService>,
    app_name: String,
    user_id: String,
    session_id: String,
    user_content: Option<Content>,
    run_config: Arc<RunConfig>,
    llm_calls: Arc<AtomicU32>,
    end_invocation: CancellationToken,
}

impl InvocationContext {
    /// Start a new invocation positioned at the tree root.
    pub fn new(
        tree: Arc<AgentTree>,
        session: Session,
        session_service: Arc<dyn SessionService>,
        run_config: RunConfig,
    ) -> Self {
        Self {
            invocation_id: Self::new_invocation_id(),
            branch: None,
            agent: tree.root().clone(),
            app_name: session.app_name.clone(),
            user_id: session.user_id.clone(),
            session_id: session.id.clone(),
            session: Arc::new(RwLock::new(session)),
            tree,
            session_service,
            user_content: None,
            run_config: Arc::new(run_config),
            llm_calls: Arc::new(AtomicU32::new(0)),
            end_invocation: CancellationToken::new(),
        }
    }

    pub fn new_invocation_id() -> String {
        format!("e-{}", uuid::Uuid::new_v4())
    }

    pub fn with_user_content(mut self, content: Content) -> Self {
        self.user_content = Some(content);
        self
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    /// Context for running `agent` beneath this one. Ending the child does
    /// not end the parent.
    pub fn for_agent(&self, agent: Arc<dyn Agent>) -> Self {
        let mut child = self.clone();
        child.agent = agent;
        child.end_invocation = self.end_invocation.child_token();
        child
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }

    pub fn agent_name(&self) -> &str {
        self.agent.name()
    }

    pub fn tree(&self) -> &Arc<AgentTree> {
        &self.tree
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn session_service(&self) -> &Arc<dyn SessionService> {
        &self.session_service
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_content(&self) -> Option<&Content> {
        self.user_content.as_ref()
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    /// Empty event authored by the current agent on the current branch.
    pub fn new_event(&self) -> Event {
        Event::new(&self.invocation_id, self.agent.name()).with_branch(self.branch.clone())
    }

    /// Read one committed state value.
    pub async fn state_value(&self, key: &str) -> Option<serde_json::Value> {
        self.session.read().await.state.get(key).cloned()
    }

    /// Copy of the session's events.
    pub async fn events(&self) -> Vec<Event> {
        self.session.read().await.events.clone()
    }

    /// Count one model call against `max_llm_calls`.
    pub fn increment_llm_call_count(&self) -> Result<()> {
        let count = self.llm_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.run_config.llm_call_limit() {
            Some(limit) if count > limit => Err(ArborError::LlmCallsLimitExceeded(limit)),
            _ => Ok(()),
        }
    }

    pub fn llm_call_count(&self) -> u32 {
        self.llm_calls.load(Ordering::SeqCst)
    }

    /// Stop the current agent after its in-flight step.
    pub fn end_invocation(&self) {
        self.end_invocation.cancel();
    }

    pub fn is_ended(&self) -> bool {
        self.end_invocation.is_cancelled()
    }
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("invocation_id", &self.invocation_id)
            .field("branch", &self.branch)
            .field("agent", &self.agent.name())
            .field("session_id", &self.session_id)
            .finish()
    }
}
