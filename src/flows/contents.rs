//! Conversation history sent to the model.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::events::{Event, USER_AUTHOR};
use crate::types::{Content, Part, Role};

/// Build the model-facing history for `agent_name` on `branch` from the
/// session's events.
pub fn build_contents(branch: Option<&str>, events: &[Event], agent_name: &str) -> Vec<Content> {
    let filtered: Vec<Content> = events
        .iter()
        .filter(|event| belongs_to_branch(branch, event))
        .filter_map(|event| {
            let content = event.content.as_ref().filter(|c| !c.parts.is_empty())?;
            if is_other_agent_reply(agent_name, event) {
                Some(convert_foreign_event(&event.author, content))
            } else {
                Some(content.clone())
            }
        })
        .collect();

    let rearranged = rearrange_for_latest_function_response(filtered);
    rearrange_async_function_responses(rearranged)
}

/// An event is visible on a branch when its own branch is that branch or
/// an ancestor of it. Unbranched events are visible everywhere.
pub fn belongs_to_branch(branch: Option<&str>, event: &Event) -> bool {
    let (Some(current), Some(origin)) = (
        branch.filter(|b| !b.is_empty()),
        event.branch.as_deref().filter(|b| !b.is_empty()),
    ) else {
        return true;
    };
    current == origin
        || current
            .strip_prefix(origin)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn is_other_agent_reply(agent_name: &str, event: &Event) -> bool {
    !agent_name.is_empty() && event.author != agent_name && event.author != USER_AUTHOR
}

/// Present another agent's turn to this agent as user-provided context.
fn convert_foreign_event(author: &str, content: &Content) -> Content {
    let mut parts = vec![Part::text("For context:")];
    for part in &content.parts {
        let text = match part {
            Part::Text { text } => format!("[{author}] said: {text}"),
            Part::FunctionCall(call) => format!(
                "[{author}] called tool `{}` with parameters: {}",
                call.name, call.args
            ),
            Part::FunctionResponse(response) => format!(
                "[{author}] `{}` tool returned result: {}",
                response.name, response.response
            ),
        };
        parts.push(Part::text(text));
    }
    Content::new(Role::User, parts)
}

/// Fold several function-response contents into the first. A later
/// response for the same call id replaces the earlier one in place.
fn merge_function_responses(contents: Vec<Content>) -> Option<Content> {
    let mut contents = contents.into_iter();
    let mut merged = contents.next()?;
    let mut positions: HashMap<String, usize> = merged
        .parts
        .iter()
        .enumerate()
        .filter_map(|(index, part)| match part {
            Part::FunctionResponse(response) => Some((response.id.clone(), index)),
            _ => None,
        })
        .collect();

    for content in contents {
        for part in content.parts {
            let id = match &part {
                Part::FunctionResponse(response) => Some(response.id.clone()),
                _ => None,
            };
            match id.map(|id| positions.get(&id).copied().ok_or(id)) {
                Some(Ok(index)) => merged.parts[index] = part,
                Some(Err(id)) => {
                    positions.insert(id, merged.parts.len());
                    merged.parts.push(part);
                }
                None => merged.parts.push(part),
            }
        }
    }
    Some(merged)
}

fn call_ids(content: &Content) -> Vec<String> {
    content
        .function_calls()
        .iter()
        .map(|call| call.id.clone())
        .collect()
}

/// When the newest content answers an earlier (async) call, drop what came
/// between the call and that answer and put the merged responses right
/// after the call.
fn rearrange_for_latest_function_response(contents: Vec<Content>) -> Vec<Content> {
    let Some(last) = contents.last() else {
        return contents;
    };
    let mut response_ids: HashSet<String> = last
        .function_responses()
        .iter()
        .map(|response| response.id.clone())
        .collect();
    if response_ids.is_empty() {
        return contents;
    }

    let last_index = contents.len() - 1;
    if last_index >= 1
        && call_ids(&contents[last_index - 1])
            .iter()
            .any(|id| response_ids.contains(id))
    {
        return contents;
    }

    let Some(call_index) = (0..last_index)
        .rev()
        .find(|index| call_ids(&contents[*index]).iter().any(|id| response_ids.contains(id)))
    else {
        tracing::warn!(ids = ?response_ids, "no function call found for latest function response");
        return contents;
    };
    response_ids.extend(call_ids(&contents[call_index]));

    let mut responses: Vec<Content> = contents[call_index + 1..last_index]
        .iter()
        .filter(|content| {
            content
                .function_responses()
                .first()
                .is_some_and(|response| response_ids.contains(&response.id))
        })
        .cloned()
        .collect();
    responses.push(last.clone());

    let mut result = contents[..=call_index].to_vec();
    result.extend(merge_function_responses(responses));
    result
}

/// Place every function response directly after the call it answers.
fn rearrange_async_function_responses(contents: Vec<Content>) -> Vec<Content> {
    let mut response_index: HashMap<String, usize> = HashMap::new();
    for (index, content) in contents.iter().enumerate() {
        for response in content.function_responses() {
            response_index.insert(response.id.clone(), index);
        }
    }

    let mut result = Vec::with_capacity(contents.len());
    for content in &contents {
        if !content.function_responses().is_empty() {
            continue;
        }
        let calls = content.function_calls();
        if calls.is_empty() {
            result.push(content.clone());
            continue;
        }

        let indices: BTreeSet<usize> = calls
            .iter()
            .filter_map(|call| response_index.get(&call.id).copied())
            .collect();
        result.push(content.clone());
        match indices.len() {
            0 => {}
            1 => result.extend(indices.iter().map(|i| contents[*i].clone())),
            _ => result.extend(merge_function_responses(
                indices.iter().map(|i| contents[*i].clone()).collect(),
            )),
        }
    }
    result
}
