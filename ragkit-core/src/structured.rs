//! Structured output via forced tool use.
//!
//! Constrains a completion to a single tool whose input schema describes the
//! desired output shape, then returns the tool call's input as the result.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{PipelineError, RagError};
use crate::providers::LlmProvider;
use crate::types::{CompletionRequest, Message, ToolChoice, ToolDefinition};

/// Extracts schema-conforming JSON from a generation provider.
pub struct StructuredExtractor {
    provider: Arc<dyn LlmProvider>,
}

impl StructuredExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Run `prompt` with `tool` forced and return the tool call's input.
    ///
    /// The input conforms to the tool's JSON Schema as far as the provider
    /// enforces it; a response with no tool call is an error.
    pub async fn extract(&self, prompt: &str, tool: ToolDefinition) -> Result<Value, RagError> {
        let tool_name = tool.name.clone();
        let mut request = CompletionRequest::new(vec![Message::user(prompt)]);
        request.tool_choice = Some(ToolChoice::Tool {
            name: tool_name.clone(),
        });
        request.tools = Some(vec![tool]);
        request.temperature = Some(0.0);

        let response = self.provider.complete(request).await?;
        match response.tool_use() {
            Some((_, name, input)) if name == tool_name => Ok(input.clone()),
            _ => Err(PipelineError::StructuredOutputMissing { tool: tool_name }.into()),
        }
    }

    /// Like `extract`, deserializing the result into `T`.
    pub async fn extract_as<T: DeserializeOwned>(
        &self,
        prompt: &str,
        tool: ToolDefinition,
    ) -> Result<T, RagError> {
        let value = self.extract(prompt, tool).await?;
        Ok(serde_json::from_value(value)?)
    }
}
