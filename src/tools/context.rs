//! Context available during tool execution.

use crate::agents::{CallbackContext, InvocationContext};
use crate::events::EventActions;

/// A [`CallbackContext`] bound to one function call. Actions recorded here
/// are attached to the function response event.
#[derive(Debug, Clone)]
pub struct ToolContext {
    callback: CallbackContext,
    function_call_id: String,
}

impl ToolContext {
    pub fn new(invocation: InvocationContext, function_call_id: impl Into<String>) -> Self {
        Self {
            callback: CallbackContext::new(invocation),
            function_call_id: function_call_id.into(),
        }
    }

    pub fn function_call_id(&self) -> &str {
        &self.function_call_id
    }

    pub fn invocation(&self) -> &InvocationContext {
        self.callback.invocation()
    }

    pub fn agent_name(&self) -> &str {
        self.callback.agent_name()
    }

    pub async fn state(&self, key: &str) -> Option<serde_json::Value> {
        self.callback.state(key).await
    }

    pub fn set_state(&self, key: impl Into<String>, value: serde_json::Value) {
        self.callback.set_state(key, value);
    }

    /// End the enclosing sequential or loop agent.
    pub fn escalate(&self) {
        self.callback.with_actions(|actions| actions.escalate = true);
    }

    pub fn transfer_to_agent(&self, agent_name: impl Into<String>) {
        let agent_name = agent_name.into();
        self.callback
            .with_actions(|actions| actions.transfer_to_agent = Some(agent_name));
    }

    pub fn skip_summarization(&self) {
        self.callback
            .with_actions(|actions| actions.skip_summarization = true);
    }

    pub fn actions(&self) -> EventActions {
        self.callback.actions()
    }
}
