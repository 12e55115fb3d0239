//! Conversation content exchanged between users, agents and models.

use serde::{Deserialize, Serialize};

/// A single turn of content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Create user content holding one text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    /// Create model content holding one text part.
    pub fn model_text(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![Part::text(text)])
    }

    /// Extract the text content, concatenating all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::FunctionCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn function_responses(&self) -> Vec<&FunctionResponse> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::FunctionResponse(response) => Some(response),
                _ => None,
            })
            .collect()
    }

    /// Whether any part carries text, a call or a response.
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|part| match part {
            Part::Text { text } => text.is_empty(),
            _ => false,
        })
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A single part of content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn function_call(
        id: impl Into<String>,
        name: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Self::FunctionCall(FunctionCall {
            id: id.into(),
            name: name.into(),
            args,
        })
    }

    pub fn function_response(
        id: impl Into<String>,
        name: impl Into<String>,
        response: serde_json::Value,
    ) -> Self {
        Self::FunctionResponse(FunctionResponse {
            id: id.into(),
            name: name.into(),
            response,
        })
    }
}

/// A function call issued by a model.
///
/// `id` is empty when the model did not assign one; the flow fills it in
/// before the call is recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// The result of a function call, matched to the call by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_serializes_with_type_tag() {
        let part = Part::function_call("c1", "roll_die", serde_json::json!({"sides": 6}));
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "function_call");
        assert_eq!(json["name"], "roll_die");
    }

    #[test]
    fn text_joins_text_parts_only() {
        let content = Content::new(
            Role::Model,
            vec![
                Part::text("a"),
                Part::function_call("c1", "t", serde_json::json!({})),
                Part::text("b"),
            ],
        );
        assert_eq!(content.text(), "ab");
        assert_eq!(content.function_calls().len(), 1);
        assert!(!content.is_empty());
        assert!(Content::new(Role::User, vec![Part::text("")]).is_empty());
    }
}
