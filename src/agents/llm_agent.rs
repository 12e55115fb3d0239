//! Model-driven agent.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::callbacks::{
    AfterModelCallback, AfterToolCallback, AgentCallback, AgentCallbacks, BeforeModelCallback,
    BeforeToolCallback,
};
use super::context::InvocationContext;
use super::{unsupported_stream, Agent, AgentKind, EventStream};
use crate::flows::llm_flow;
use crate::models::Llm;
use crate::tools::Tool;

/// Which session history is sent to the model.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncludeContents {
    /// Events relevant to this agent's branch.
    #[default]
    Default,
    /// No history; the model sees only the current user message.
    None,
}

/// An agent whose steps are decided by a model: it may answer, call
/// tools, or hand control to another agent in the tree.
pub struct LlmAgent {
    name: String,
    description: String,
    model: Arc<dyn Llm>,
    instruction: String,
    global_instruction: String,
    tools: Vec<Arc<dyn Tool>>,
    sub_agents: Vec<Arc<dyn Agent>>,
    disallow_transfer_to_parent: bool,
    disallow_transfer_to_peers: bool,
    include_contents: IncludeContents,
    output_key: Option<String>,
    callbacks: AgentCallbacks,
    before_model_callbacks: Vec<BeforeModelCallback>,
    after_model_callbacks: Vec<AfterModelCallback>,
    before_tool_callbacks: Vec<BeforeToolCallback>,
    after_tool_callbacks: Vec<AfterToolCallback>,
}

impl LlmAgent {
    pub fn new(name: impl Into<String>, model: Arc<dyn Llm>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            model,
            instruction: String::new(),
            global_instruction: String::new(),
            tools: Vec::new(),
            sub_agents: Vec::new(),
            disallow_transfer_to_parent: false,
            disallow_transfer_to_peers: false,
            include_contents: IncludeContents::Default,
            output_key: None,
            callbacks: AgentCallbacks::default(),
            before_model_callbacks: Vec::new(),
            after_model_callbacks: Vec::new(),
            before_tool_callbacks: Vec::new(),
            after_tool_callbacks: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Instruction for this agent. `{key}` is replaced by the state value,
    /// `{key?}` by the value or nothing.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Instruction applied to every agent in the tree; only the root's is used.
    pub fn with_global_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.global_instruction = instruction.into();
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
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

    pub fn with_disallow_transfer_to_parent(mut self, disallow: bool) -> Self {
        self.disallow_transfer_to_parent = disallow;
        self
    }

    pub fn with_disallow_transfer_to_peers(mut self, disallow: bool) -> Self {
        self.disallow_transfer_to_peers = disallow;
        self
    }

    pub fn with_include_contents(mut self, include_contents: IncludeContents) -> Self {
        self.include_contents = include_contents;
        self
    }

    /// Save the final reply text into this state key.
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
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

    pub fn with_before_model_callback(mut self, callback: BeforeModelCallback) -> Self {
        self.before_model_callbacks.push(callback);
        self
    }

    pub fn with_after_model_callback(mut self, callback: AfterModelCallback) -> Self {
        self.after_model_callbacks.push(callback);
        self
    }

    pub fn with_before_tool_callback(mut self, callback: BeforeToolCallback) -> Self {
        self.before_tool_callbacks.push(callback);
        self
    }

    pub fn with_after_tool_callback(mut self, callback: AfterToolCallback) -> Self {
        self.after_tool_callbacks.push(callback);
        self
    }

    pub fn model(&self) -> &Arc<dyn Llm> {
        &self.model
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn global_instruction(&self) -> &str {
        &self.global_instruction
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn disallow_transfer_to_parent(&self) -> bool {
        self.disallow_transfer_to_parent
    }

    pub fn disallow_transfer_to_peers(&self) -> bool {
        self.disallow_transfer_to_peers
    }

    pub fn include_contents(&self) -> IncludeContents {
        self.include_contents
    }

    pub fn output_key(&self) -> Option<&str> {
        self.output_key.as_deref()
    }

    pub fn before_model_callbacks(&self) -> &[BeforeModelCallback] {
        &self.before_model_callbacks
    }

    pub fn after_model_callbacks(&self) -> &[AfterModelCallback] {
        &self.after_model_callbacks
    }

    pub fn before_tool_callbacks(&self) -> &[BeforeToolCallback] {
        &self.before_tool_callbacks
    }

    pub fn after_tool_callbacks(&self) -> &[AfterToolCallback] {
        &self.after_tool_callbacks
    }
}

impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Llm
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.sub_agents
    }

    fn callbacks(&self) -> &AgentCallbacks {
        &self.callbacks
    }

    fn as_llm_agent(&self) -> Option<&LlmAgent> {
        Some(self)
    }

    fn run_impl(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        llm_flow::run(self, ctx)
    }

    fn run_live_impl(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        unsupported_stream(format!(
            "agent '{}' has no live model connection",
            ctx.agent_name()
        ))
    }
}

impl std::fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAgent")
            .field("name", &self.name)
            .field("model", &self.model.model_name())
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("sub_agents", &self.sub_agents)
            .field("disallow_transfer_to_parent", &self.disallow_transfer_to_parent)
            .field("disallow_transfer_to_peers", &self.disallow_transfer_to_peers)
            .finish()
    }
}
