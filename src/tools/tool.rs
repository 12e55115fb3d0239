//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::context::ToolContext;
use super::types::ToolParameters;
use crate::error::ArborError;
use crate::models::ToolDeclaration;

const LONG_RUNNING_NOTE: &str = "NOTE: This is a long-running operation. Do not call this tool \
again if it has already returned some intermediate or pending status.";

/// Core tool trait. Implement it to create custom tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &ToolParameters;

    /// Long-running tools may return a pending result now and deliver the
    /// real one in a later turn as a function response with the same id.
    fn is_long_running(&self) -> bool {
        false
    }

    /// Definition sent to the model.
    fn declaration(&self) -> ToolDeclaration {
        let description = if self.is_long_running() {
            format!("{}\n\n{LONG_RUNNING_NOTE}", self.description())
        } else {
            self.description().to_string()
        };
        ToolDeclaration {
            name: self.name().to_string(),
            description,
            parameters: self.parameters().schema.clone(),
        }
    }

    /// Execute the tool with parsed arguments.
    async fn run_async(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ArborError>;
}

/// Type alias for the tool handler function.
type ToolHandler = dyn Fn(
        ToolArguments,
        ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ArborError>> + Send>>
    + Send
    + Sync;

/// Closure-based tool for quick tool creation.
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    long_running: bool,
    handler: Arc<ToolHandler>,
}

impl FunctionTool {
    /// Create a tool from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, ArborError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            long_running: false,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }

    /// Mark as long-running. A `null` result then produces no function
    /// response until the caller supplies one.
    pub fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    fn is_long_running(&self) -> bool {
        self.long_running
    }

    async fn run_async(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ArborError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("long_running", &self.long_running)
            .finish()
    }
}
