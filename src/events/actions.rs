//! Side effects carried by an event.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::sessions::StateMap;

/// Every side effect an agent step can have on shared state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventActions {
    /// State writes; key prefixes select the scope.
    #[serde(default)]
    pub state_delta: StateMap,
    /// Artifact name to the version written by this step.
    #[serde(default)]
    pub artifact_delta: HashMap<String, i64>,
    /// Hand control to the named agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_to_agent: Option<String>,
    /// End the enclosing sequential or loop agent.
    #[serde(default)]
    pub escalate: bool,
    /// Do not ask the model to summarize a function response.
    #[serde(default)]
    pub skip_summarization: bool,
}

impl EventActions {
    pub fn is_empty(&self) -> bool {
        self.state_delta.is_empty()
            && self.artifact_delta.is_empty()
            && self.transfer_to_agent.is_none()
            && !self.escalate
            && !self.skip_summarization
    }

    /// Fold `other` into `self`. Deltas are unioned with `other` winning;
    /// flags are or-ed; a transfer in `other` replaces one in `self`.
    pub fn merge(&mut self, other: EventActions) {
        self.state_delta.extend(other.state_delta);
        self.artifact_delta.extend(other.artifact_delta);
        if other.transfer_to_agent.is_some() {
            self.transfer_to_agent = other.transfer_to_agent;
        }
        self.escalate |= other.escalate;
        self.skip_summarization |= other.skip_summarization;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_unions_deltas_and_keeps_latest_transfer() {
        let mut base = EventActions::default();
        base.state_delta.insert("a".into(), json!(1));
        base.transfer_to_agent = Some("first".into());

        let mut later = EventActions::default();
        later.state_delta.insert("a".into(), json!(2));
        later.state_delta.insert("b".into(), json!(3));
        later.escalate = true;
        later.transfer_to_agent = Some("second".into());

        base.merge(later);
        assert_eq!(base.state_delta["a"], json!(2));
        assert_eq!(base.state_delta["b"], json!(3));
        assert!(base.escalate);
        assert_eq!(base.transfer_to_agent.as_deref(), Some("second"));
    }

    #[test]
    fn default_actions_are_empty() {
        assert!(EventActions::default().is_empty());
    }
}
