//! The step loop driving an [`LlmAgent`].

use std::sync::Arc;

use async_stream::try_stream;
use futures::stream::{self, StreamExt};

use super::contents::build_contents;
use super::functions::{
    handle_function_calls_async, long_running_call_ids, populate_client_function_call_ids,
    tool_map, ToolMap,
};
use super::instructions::{build_instructions, transfer_instruction};
use crate::agents::{
    run_agent, Agent, CallbackContext, EventStream, IncludeContents, InvocationContext, LlmAgent,
};
use crate::config::StreamingMode;
use crate::error::{ArborError, Result};
use crate::events::Event;
use crate::models::{LlmRequest, LlmResponse, LlmResponseStream};
use crate::tools::{Tool, TransferToAgentTool};

/// Run steps until one ends with a final response or produces nothing.
pub fn run(agent: Arc<LlmAgent>, ctx: InvocationContext) -> EventStream {
    Box::pin(try_stream! {
        loop {
            let mut last_event: Option<Event> = None;
            let mut step = run_one_step(agent.clone(), ctx.clone());
            while let Some(event) = step.next().await {
                let event = event?;
                last_event = Some(event.clone());
                yield event;
            }

            match last_event {
                None => break,
                Some(event) if event.is_final_response() => break,
                Some(event) if event.partial => {
                    Err::<(), _>(ArborError::Model(format!(
                        "response stream for agent '{}' ended on a partial response",
                        event.author
                    )))?;
                }
                Some(_) => {}
            }
            if ctx.is_ended() {
                break;
            }
        }
    })
}

/// Tools offered to the model, plus `transfer_to_agent` when the agent has
/// somewhere to transfer to.
fn agent_tools(agent: &LlmAgent, ctx: &InvocationContext) -> Vec<Arc<dyn Tool>> {
    let mut tools = agent.tools().to_vec();
    if !ctx.tree().transfer_targets(agent.name()).is_empty() {
        tools.push(Arc::new(TransferToAgentTool::new()));
    }
    tools
}

async fn build_request(
    agent: &LlmAgent,
    ctx: &InvocationContext,
    tools: &[Arc<dyn Tool>],
) -> Result<LlmRequest> {
    let mut request = LlmRequest::new(agent.model().model_name());
    for instruction in build_instructions(agent, ctx).await? {
        request.append_instruction(instruction);
    }

    let targets = ctx.tree().transfer_targets(agent.name());
    if !targets.is_empty() {
        request.append_instruction(transfer_instruction(&targets, ctx.tree().parent(agent.name())));
    }

    request.contents = match agent.include_contents() {
        IncludeContents::Default => build_contents(ctx.branch(), &ctx.events().await, agent.name()),
        IncludeContents::None => ctx.user_content().cloned().into_iter().collect(),
    };
    request.tools = tools.iter().map(|tool| tool.declaration()).collect();
    Ok(request)
}

async fn call_model(
    agent: &LlmAgent,
    ctx: &InvocationContext,
    cb_ctx: &CallbackContext,
    request: LlmRequest,
) -> Result<LlmResponseStream> {
    ctx.increment_llm_call_count()?;
    for hook in agent.before_model_callbacks() {
        let reply = hook(cb_ctx.clone(), request.clone())
            .await
            .map_err(|err| ArborError::in_hook("before_model", err))?;
        if let Some(response) = reply {
            tracing::debug!(agent = %agent.name(), "model call replaced by before_model_callback");
            return Ok(Box::pin(stream::once(async move { Ok::<_, ArborError>(response) })));
        }
    }

    let streaming = ctx.run_config().streaming_mode == StreamingMode::Sse;
    tracing::debug!(
        invocation_id = %ctx.invocation_id(),
        agent = %agent.name(),
        model = %agent.model().model_name(),
        contents = request.contents.len(),
        llm_calls = ctx.llm_call_count(),
        streaming,
        "calling model"
    );
    agent.model().generate_content(request, streaming).await
}

async fn apply_after_model_hooks(
    agent: &LlmAgent,
    cb_ctx: &CallbackContext,
    response: LlmResponse,
) -> Result<LlmResponse> {
    for hook in agent.after_model_callbacks() {
        let reply = hook(cb_ctx.clone(), response.clone())
            .await
            .map_err(|err| ArborError::in_hook("after_model", err))?;
        if let Some(replacement) = reply {
            return Ok(replacement);
        }
    }
    Ok(response)
}

/// Turn a model response into an event of this agent.
fn finalize_model_event(
    agent: &LlmAgent,
    ctx: &InvocationContext,
    cb_ctx: &CallbackContext,
    response: LlmResponse,
    tools: &ToolMap,
) -> Event {
    let mut event = ctx.new_event().with_actions(cb_ctx.actions());
    event.content = response.content;
    event.partial = response.partial;
    event.turn_complete = response.turn_complete;
    event.error_code = response.error_code;
    event.error_message = response.error_message;
    event.interrupted = response.interrupted;

    populate_client_function_call_ids(&mut event);
    event.long_running_tool_ids = long_running_call_ids(&event, tools);

    if let Some(key) = agent.output_key() {
        if event.is_final_response() {
            if let Some(text) = event.text().filter(|text| !text.is_empty()) {
                event
                    .actions
                    .state_delta
                    .insert(key.to_string(), serde_json::Value::String(text));
            }
        }
    }
    event
}

fn run_one_step(agent: Arc<LlmAgent>, ctx: InvocationContext) -> EventStream {
    Box::pin(try_stream! {
        let tools = agent_tools(&agent, &ctx);
        let request = build_request(&agent, &ctx, &tools).await?;
        if ctx.is_ended() {
            return;
        }
        let tools = tool_map(tools);

        let cb_ctx = CallbackContext::new(ctx.clone());
        let mut responses = call_model(&agent, &ctx, &cb_ctx, request).await?;

        while let Some(response) = responses.next().await {
            let response = apply_after_model_hooks(&agent, &cb_ctx, response?).await?;
            if response.is_empty() {
                continue;
            }

            let event = finalize_model_event(&agent, &ctx, &cb_ctx, response, &tools);
            let has_calls = !event.partial && !event.function_calls().is_empty();
            yield event.clone();
            if !has_calls {
                continue;
            }

            let Some(response_event) = handle_function_calls_async(&ctx, &event, &tools).await? else {
                continue;
            };
            let transfer = response_event.actions.transfer_to_agent.clone();
            yield response_event;

            if let Some(target) = transfer {
                let next = ctx
                    .tree()
                    .find_agent(&target)
                    .cloned()
                    .ok_or_else(|| ArborError::AgentNotFound(target.clone()))?;
                tracing::debug!(
                    invocation_id = %ctx.invocation_id(),
                    from = %agent.name(),
                    to = %target,
                    "transferring to agent"
                );
                let mut events = run_agent(next, &ctx);
                while let Some(event) = events.next().await {
                    yield event?;
                }
            }
        }
    })
}
