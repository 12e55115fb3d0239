//! System instructions for an LLM request.

use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};

use crate::agents::{Agent, InvocationContext, LlmAgent};
use crate::error::{ArborError, Result};
use crate::sessions::{State, APP_PREFIX, TEMP_PREFIX, USER_PREFIX};
use crate::tools::TRANSFER_TO_AGENT;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{+[^{}]*\}+").expect("placeholder regex must compile")
});

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex must compile")
});

/// Replace `{key}` with the state value for `key` and `{key?}` with the
/// value or nothing. Placeholders that are not state names are kept as
/// written. A missing required key is an error.
pub fn inject_session_state(template: &str, state: &State) -> Result<String> {
    let mut missing: Option<String> = None;
    let rendered = PLACEHOLDER_RE.replace_all(template, |caps: &Captures<'_>| {
        let raw = &caps[0];
        let inner = raw.trim_matches(|c| c == '{' || c == '}').trim();
        let (name, optional) = match inner.strip_suffix('?') {
            Some(name) => (name, true),
            None => (inner, false),
        };

        if !is_valid_state_name(name) {
            return raw.to_string();
        }
        match state.get(name) {
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(value) => value.to_string(),
            None if optional => String::new(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                raw.to_string()
            }
        }
    });

    match missing {
        Some(name) => Err(ArborError::InvalidArgument(format!(
            "Context variable not found: `{name}`"
        ))),
        None => Ok(rendered.into_owned()),
    }
}

fn is_valid_state_name(name: &str) -> bool {
    let bare = [APP_PREFIX, USER_PREFIX, TEMP_PREFIX]
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name);
    IDENTIFIER_RE.is_match(bare)
}

/// Global instruction of the root (if it is an LLM agent), then the agent's
/// own instruction, both with state injected.
pub async fn build_instructions(agent: &LlmAgent, ctx: &InvocationContext) -> Result<Vec<String>> {
    let state = ctx.session().read().await.state.clone();
    let mut instructions = Vec::new();

    if let Some(root) = ctx.tree().root().as_llm_agent() {
        if !root.global_instruction().is_empty() {
            instructions.push(inject_session_state(root.global_instruction(), &state)?);
        }
    }
    if !agent.instruction().is_empty() {
        instructions.push(inject_session_state(agent.instruction(), &state)?);
    }
    Ok(instructions)
}

/// Instruction describing the agents this agent may transfer to.
pub fn transfer_instruction(
    targets: &[Arc<dyn Agent>],
    parent: Option<&Arc<dyn Agent>>,
) -> String {
    let listing: Vec<String> = targets
        .iter()
        .map(|target| {
            format!(
                "Agent name: {}\nAgent description: {}\n",
                target.name(),
                target.description()
            )
        })
        .collect();

    let mut instruction = format!(
        "You have a list of other agents to transfer to:\n\n{}\n\
         If you are the best to answer the question according to your description, you \
         can answer it.\n\n\
         If another agent is better for answering the question according to its \
         description, call `{TRANSFER_TO_AGENT}` function to transfer the question to that \
         agent. When transferring, do not generate any text other than the function call.\n",
        listing.join("\n")
    );

    if let Some(parent) = parent {
        instruction.push_str(&format!(
            "\nYour parent agent is {}. If neither the other agents nor you are best for \
             answering the question according to the descriptions, transfer to your parent \
             agent.\n",
            parent.name()
        ));
    }
    instruction
}
