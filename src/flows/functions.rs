//! Function-call dispatch: run the tools a model asked for and collect
//! their responses into one event.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::json;

use crate::agents::{AfterToolCallback, BeforeToolCallback, InvocationContext};
use crate::error::Result;
use crate::events::{Event, EventActions};
use crate::tools::{validate_arguments, ArgumentViolation, Tool, ToolArguments, ToolContext};
use crate::types::{Content, FunctionCall, Part, Role};

/// Prefix of ids assigned to function calls the model left unnamed.
pub const CLIENT_FUNCTION_CALL_ID_PREFIX: &str = "call-";

/// Tools an agent exposes, keyed by name.
pub type ToolMap = HashMap<String, Arc<dyn Tool>>;

pub fn tool_map(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> ToolMap {
    tools
        .into_iter()
        .map(|tool| (tool.name().to_string(), tool))
        .collect()
}

pub fn generate_client_function_call_id() -> String {
    format!("{CLIENT_FUNCTION_CALL_ID_PREFIX}{}", uuid::Uuid::new_v4())
}

/// Give every id-less function call in the event a generated id.
pub fn populate_client_function_call_ids(event: &mut Event) {
    let Some(content) = event.content.as_mut() else {
        return;
    };
    for part in &mut content.parts {
        if let Part::FunctionCall(call) = part {
            if call.id.is_empty() {
                call.id = generate_client_function_call_id();
            }
        }
    }
}

/// Ids of the calls in `event` that target long-running tools.
pub fn long_running_call_ids(event: &Event, tools: &ToolMap) -> BTreeSet<String> {
    event
        .function_calls()
        .into_iter()
        .filter(|call| tools.get(&call.name).is_some_and(|tool| tool.is_long_running()))
        .map(|call| call.id.clone())
        .collect()
}

/// Result of one call before it becomes a response part.
struct CallOutcome {
    response: serde_json::Value,
    failure: Option<(String, String)>,
}

impl CallOutcome {
    fn ok(response: serde_json::Value) -> Self {
        Self {
            response,
            failure: None,
        }
    }
}

fn hook_error_result(source: &str, error: impl std::fmt::Display) -> serde_json::Value {
    json!({
        "error": format!("{source} failed: {error}"),
        "source": source,
    })
}

fn missing_arguments_result(tool_name: &str, missing: &[String]) -> serde_json::Value {
    json!({
        "error": format!(
            "Invoking `{tool_name}()` failed as the following mandatory input parameters are \
             not present, missing: {}. You could retry calling this tool, but it is IMPORTANT \
             for you to provide all the mandatory parameters.",
            missing.join(", ")
        ),
    })
}

async fn run_before_tool_hooks(
    hooks: &[BeforeToolCallback],
    call: &FunctionCall,
    tool_ctx: &ToolContext,
) -> Option<serde_json::Value> {
    for hook in hooks {
        match hook(call.clone(), tool_ctx.clone()).await {
            Ok(Some(result)) => return Some(result),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(tool = %call.name, error = %err, "before_tool_callback failed");
                return Some(hook_error_result("before_tool_callback", err));
            }
        }
    }
    None
}

async fn run_after_tool_hooks(
    hooks: &[AfterToolCallback],
    call: &FunctionCall,
    tool_ctx: &ToolContext,
    result: serde_json::Value,
) -> serde_json::Value {
    for hook in hooks {
        match hook(call.clone(), tool_ctx.clone(), result.clone()).await {
            Ok(Some(replacement)) => return replacement,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(tool = %call.name, error = %err, "after_tool_callback failed");
                let mut failure = hook_error_result("after_tool_callback", err);
                failure["original_result"] = result;
                return failure;
            }
        }
    }
    result
}

async fn invoke_tool(tool: &Arc<dyn Tool>, call: &FunctionCall, tool_ctx: &ToolContext) -> CallOutcome {
    match validate_arguments(&call.args, &tool.parameters().schema) {
        Ok(()) => {}
        Err(ArgumentViolation::Missing(missing)) => {
            return CallOutcome::ok(missing_arguments_result(&call.name, &missing));
        }
        Err(violation) => {
            return CallOutcome::ok(json!({
                "error": format!("Argument validation failed: {violation}"),
            }));
        }
    }

    let args = match &call.args {
        serde_json::Value::Null => ToolArguments::new(json!({})),
        other => ToolArguments::new(other.clone()),
    };
    match tool.run_async(&args, tool_ctx).await {
        Ok(value) => CallOutcome::ok(value),
        Err(err) => {
            tracing::warn!(tool = %call.name, error = %err, "tool failed");
            CallOutcome {
                response: json!({ "error": err.to_string() }),
                failure: Some((err.error_code(), err.to_string())),
            }
        }
    }
}

async fn dispatch_call(
    ctx: &InvocationContext,
    call: &FunctionCall,
    tools: &ToolMap,
    before_hooks: &[BeforeToolCallback],
    after_hooks: &[AfterToolCallback],
) -> (ToolContext, CallOutcome) {
    let tool_ctx = ToolContext::new(ctx.clone(), call.id.clone());

    let Some(tool) = tools.get(&call.name) else {
        let mut available: Vec<&str> = tools.keys().map(String::as_str).collect();
        available.sort_unstable();
        tracing::warn!(agent = %ctx.agent_name(), tool = %call.name, "model requested unknown tool");
        let response = json!({
            "error": format!(
                "Tool '{}' not found. Available tools: {}",
                call.name,
                available.join(", ")
            ),
        });
        return (tool_ctx, CallOutcome::ok(response));
    };

    let mut outcome = match run_before_tool_hooks(before_hooks, call, &tool_ctx).await {
        Some(result) => CallOutcome::ok(result),
        None => invoke_tool(tool, call, &tool_ctx).await,
    };
    outcome.response = run_after_tool_hooks(after_hooks, call, &tool_ctx, outcome.response).await;
    (tool_ctx, outcome)
}

/// Run every function call in `model_event` and return one event holding
/// all responses, or `None` when no call produced a response (a
/// long-running tool that returns `null` stays pending).
pub async fn handle_function_calls_async(
    ctx: &InvocationContext,
    model_event: &Event,
    tools: &ToolMap,
) -> Result<Option<Event>> {
    let calls: Vec<FunctionCall> = model_event.function_calls().into_iter().cloned().collect();
    if calls.is_empty() {
        return Ok(None);
    }

    let (before_hooks, after_hooks) = match ctx.agent().as_llm_agent() {
        Some(agent) => (
            agent.before_tool_callbacks().to_vec(),
            agent.after_tool_callbacks().to_vec(),
        ),
        None => (Vec::new(), Vec::new()),
    };

    let mut parts = Vec::with_capacity(calls.len());
    let mut actions = EventActions::default();
    let mut failure: Option<(String, String)> = None;
    let long_running_ids = long_running_call_ids(model_event, tools);

    for call in &calls {
        tracing::debug!(
            invocation_id = %ctx.invocation_id(),
            agent = %ctx.agent_name(),
            tool = %call.name,
            call_id = %call.id,
            "dispatching function call"
        );
        let (tool_ctx, outcome) = dispatch_call(ctx, call, tools, &before_hooks, &after_hooks).await;

        if long_running_ids.contains(&call.id) && outcome.response.is_null() {
            continue;
        }
        if failure.is_none() {
            failure = outcome.failure;
        }

        let response = if outcome.response.is_object() {
            outcome.response
        } else {
            json!({ "result": outcome.response })
        };
        parts.push(Part::function_response(call.id.clone(), call.name.clone(), response));
        actions.merge(tool_ctx.actions());
    }

    if parts.is_empty() {
        return Ok(None);
    }

    let mut event = ctx
        .new_event()
        .with_content(Content::new(Role::User, parts))
        .with_actions(actions);
    event.long_running_tool_ids = long_running_ids;
    if let Some((code, message)) = failure {
        event = event.with_error(code, message);
    }
    Ok(Some(event))
}
