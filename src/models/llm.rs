//! Model interface consumed by LLM agents.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::ArborError;
use crate::types::Content;

/// Tool definition sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A request sent to a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub model: String,
    /// System instructions, in the order they were appended.
    #[serde(default)]
    pub system_instructions: Vec<String>,
    #[serde(default)]
    pub contents: Vec<Content>,
    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn append_instruction(&mut self, instruction: impl Into<String>) {
        let instruction = instruction.into();
        if !instruction.is_empty() {
            self.system_instructions.push(instruction);
        }
    }

    /// All system instructions joined by blank lines.
    pub fn system_instruction(&self) -> String {
        self.system_instructions.join("\n\n")
    }
}

/// One response (or streamed chunk) from a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub interrupted: bool,
}

impl LlmResponse {
    pub fn from_content(content: Content) -> Self {
        Self {
            content: Some(content),
            ..Self::default()
        }
    }

    /// Whether there is anything worth turning into an event.
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.error_code.is_none() && !self.interrupted
    }
}

/// Stream of model responses.
pub type LlmResponseStream = BoxStream<'static, Result<LlmResponse, ArborError>>;

/// Core trait implemented by every model backend.
#[async_trait]
pub trait Llm: Send + Sync {
    /// The model ID this instance serves.
    fn model_name(&self) -> &str;

    /// Generate content. With `stream` set the backend may yield partial
    /// responses before the final aggregated one.
    async fn generate_content(
        &self,
        request: LlmRequest,
        stream: bool,
    ) -> Result<LlmResponseStream, ArborError>;
}
