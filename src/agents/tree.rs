//! Arena over an agent tree, giving each agent a non-owning parent link.

use std::collections::HashMap;
use std::sync::Arc;

use super::Agent;
use crate::error::{ArborError, Result};
use crate::events::USER_AUTHOR;

struct Node {
    agent: Arc<dyn Agent>,
    parent: Option<usize>,
}

/// Index of every agent reachable from a root, keyed by name.
///
/// Agents own their sub-agents; the tree only records positions, so parent
/// lookups never form reference cycles.
pub struct AgentTree {
    nodes: Vec<Node>,
    by_name: HashMap<String, usize>,
}

impl AgentTree {
    /// Index `root` and its descendants. Names must be non-empty, unique
    /// and must not collide with the user author.
    pub fn new(root: Arc<dyn Agent>) -> Result<Self> {
        let mut tree = Self {
            nodes: Vec::new(),
            by_name: HashMap::new(),
        };
        let mut pending: Vec<(Arc<dyn Agent>, Option<usize>)> = vec![(root, None)];

        while let Some((agent, parent)) = pending.pop() {
            let name = agent.name().to_string();
            if name.is_empty() {
                return Err(ArborError::MalformedTree("agent name must not be empty".into()));
            }
            if name == USER_AUTHOR {
                return Err(ArborError::MalformedTree(format!(
                    "agent name '{USER_AUTHOR}' is reserved"
                )));
            }
            if tree.by_name.contains_key(&name) {
                return Err(ArborError::MalformedTree(format!(
                    "agent name '{name}' appears more than once"
                )));
            }

            let index = tree.nodes.len();
            tree.by_name.insert(name, index);
            for child in agent.sub_agents().iter().rev() {
                pending.push((child.clone(), Some(index)));
            }
            tree.nodes.push(Node { agent, parent });
        }

        Ok(tree)
    }

    pub fn root(&self) -> &Arc<dyn Agent> {
        &self.nodes[0].agent
    }

    pub fn is_root(&self, name: &str) -> bool {
        self.by_name.get(name) == Some(&0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn find_agent(&self, name: &str) -> Option<&Arc<dyn Agent>> {
        self.by_name.get(name).map(|index| &self.nodes[*index].agent)
    }

    pub fn parent(&self, name: &str) -> Option<&Arc<dyn Agent>> {
        let index = *self.by_name.get(name)?;
        self.nodes[index]
            .parent
            .map(|parent| &self.nodes[parent].agent)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Agents an LLM agent may hand control to: its sub-agents, then its
    /// parent and peers when the parent is an LLM agent and the agent's
    /// flags allow it.
    pub fn transfer_targets(&self, name: &str) -> Vec<Arc<dyn Agent>> {
        let Some(agent) = self.find_agent(name) else {
            return Vec::new();
        };
        let mut targets: Vec<Arc<dyn Agent>> = agent.sub_agents().to_vec();

        let Some(llm) = agent.as_llm_agent() else {
            return targets;
        };
        let Some(parent) = self.parent(name) else {
            return targets;
        };
        if parent.as_llm_agent().is_none() {
            return targets;
        }

        if !llm.disallow_transfer_to_parent() {
            targets.push(parent.clone());
        }
        if !llm.disallow_transfer_to_peers() {
            targets.extend(
                parent
                    .sub_agents()
                    .iter()
                    .filter(|peer| peer.name() != name)
                    .cloned(),
            );
        }
        targets
    }

    /// Whether a conversation may resume directly at `name`: it and every
    /// ancestor must be an LLM agent allowing transfer to its parent.
    pub fn is_transferable_across_tree(&self, name: &str) -> bool {
        let mut current = self.by_name.get(name).copied();
        if current.is_none() {
            return false;
        }
        while let Some(index) = current {
            let node = &self.nodes[index];
            match node.agent.as_llm_agent() {
                Some(llm) if !llm.disallow_transfer_to_parent() => current = node.parent,
                _ => return false,
            }
        }
        true
    }
}

impl std::fmt::Debug for AgentTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.nodes.iter().map(|n| n.agent.name()).collect();
        f.debug_struct("AgentTree").field("agents", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{LlmAgent, SequentialAgent};
    use crate::models::{Llm, LlmRequest, LlmResponse, LlmResponseStream};
    use async_trait::async_trait;

    struct NullModel;

    #[async_trait]
    impl Llm for NullModel {
        fn model_name(&self) -> &str {
            "null"
        }

        async fn generate_content(
            &self,
            _request: LlmRequest,
            _stream: bool,
        ) -> Result<LlmResponseStream> {
            Ok(Box::pin(futures::stream::empty::<Result<LlmResponse>>()))
        }
    }

    fn llm(name: &str) -> LlmAgent {
        LlmAgent::new(name, Arc::new(NullModel))
    }

    fn names(agents: &[Arc<dyn Agent>]) -> Vec<&str> {
        agents.iter().map(|a| a.name()).collect()
    }

    /// root -> [a -> [a1], b (no peers), c (no parent), seq -> [s1]]
    fn tree() -> AgentTree {
        let root = llm("root").with_sub_agents([
            Arc::new(llm("a").with_sub_agent(Arc::new(llm("a1")))) as Arc<dyn Agent>,
            Arc::new(llm("b").with_disallow_transfer_to_peers(true)) as Arc<dyn Agent>,
            Arc::new(llm("c").with_disallow_transfer_to_parent(true)) as Arc<dyn Agent>,
            Arc::new(SequentialAgent::new("seq").with_sub_agent(Arc::new(llm("s1"))))
                as Arc<dyn Agent>,
        ]);
        AgentTree::new(Arc::new(root)).unwrap()
    }

    #[test]
    fn indexes_every_agent_with_parent_links() {
        let tree = tree();
        assert_eq!(tree.len(), 7);
        assert!(tree.is_root("root"));
        assert_eq!(tree.parent("a1").map(|p| p.name()), Some("a"));
        assert_eq!(tree.parent("s1").map(|p| p.name()), Some("seq"));
        assert!(tree.parent("root").is_none());
        assert!(tree.find_agent("nobody").is_none());
    }

    #[test]
    fn transfer_targets_respect_flags() {
        let tree = tree();
        assert_eq!(names(&tree.transfer_targets("root")), vec!["a", "b", "c", "seq"]);
        assert_eq!(
            names(&tree.transfer_targets("a")),
            vec!["a1", "root", "b", "c", "seq"]
        );
        assert_eq!(names(&tree.transfer_targets("b")), vec!["root"]);
        assert_eq!(names(&tree.transfer_targets("c")), vec!["a", "b", "seq"]);
        assert!(tree.transfer_targets("s1").is_empty());
    }

    #[test]
    fn transferability_walks_ancestors() {
        let tree = tree();
        assert!(tree.is_transferable_across_tree("a1"));
        assert!(tree.is_transferable_across_tree("b"));
        assert!(!tree.is_transferable_across_tree("c"));
        assert!(!tree.is_transferable_across_tree("seq"));
        assert!(!tree.is_transferable_across_tree("s1"));
        assert!(!tree.is_transferable_across_tree("nobody"));
    }

    #[test]
    fn rejects_duplicate_and_reserved_names() {
        let dup = llm("root").with_sub_agents([
            Arc::new(llm("x")) as Arc<dyn Agent>,
            Arc::new(llm("x")) as Arc<dyn Agent>,
        ]);
        assert!(matches!(
            AgentTree::new(Arc::new(dup)),
            Err(ArborError::MalformedTree(_))
        ));
        assert!(AgentTree::new(Arc::new(llm(""))).is_err());
        assert!(AgentTree::new(Arc::new(llm(USER_AUTHOR))).is_err());
    }
}
