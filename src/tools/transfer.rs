//! Built-in tool letting an LLM agent hand control to another agent.

use async_trait::async_trait;
use serde_json::json;

use super::arguments::ToolArguments;
use super::context::ToolContext;
use super::tool::Tool;
use super::types::ToolParameters;
use crate::error::ArborError;

pub const TRANSFER_TO_AGENT: &str = "transfer_to_agent";

/// Sets `actions.transfer_to_agent` when the requested agent is one of the
/// caller's transfer targets.
#[derive(Debug, Clone)]
pub struct TransferToAgentTool {
    parameters: ToolParameters,
}

impl TransferToAgentTool {
    pub fn new() -> Self {
        Self {
            parameters: ToolParameters::object()
                .string("agent_name", "Name of the agent to transfer to.", true)
                .build(),
        }
    }
}

impl Default for TransferToAgentTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TransferToAgentTool {
    fn name(&self) -> &str {
        TRANSFER_TO_AGENT
    }

    fn description(&self) -> &str {
        "Transfer the question to another agent."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn run_async(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ArborError> {
        let agent_name = args.get_str("agent_name")?;
        let targets = ctx
            .invocation()
            .tree()
            .transfer_targets(ctx.agent_name());

        if !targets.iter().any(|target| target.name() == agent_name) {
            let valid: Vec<&str> = targets.iter().map(|t| t.name()).collect();
            tracing::warn!(
                agent = %ctx.agent_name(),
                target = %agent_name,
                "rejected transfer to unknown agent"
            );
            return Ok(json!({
                "error": format!(
                    "Agent '{agent_name}' is not a valid transfer target. Valid targets: {}",
                    valid.join(", ")
                ),
            }));
        }

        ctx.transfer_to_agent(agent_name);
        Ok(json!({ "transferred_to": agent_name }))
    }
}
