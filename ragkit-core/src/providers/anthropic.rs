//! Anthropic Messages API provider implementation.
//!
//! Implements the `LlmProvider` trait for the native Anthropic Messages API,
//! covering plain completions and schema-constrained tool use.
//!
//! API particulars handled here:
//! - Auth via `x-api-key` header (not `Authorization: Bearer`)
//! - Required `anthropic-version` header
//! - System messages become the top-level `system` field, not messages
//! - Tool use arrives as `tool_use` content blocks; a forced tool is
//!   requested via `tool_choice: {"type": "tool", "name": ...}`

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::providers::LlmProvider;
use crate::types::{
    CompletionRequest, CompletionResponse, Content, Message, Role, TokenUsage, ToolChoice,
    ToolDefinition,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// The default Anthropic API base URL.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// The required Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
    context_window: usize,
    timeout_secs: u64,
}

impl AnthropicProvider {
    /// Create a new provider from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`; returns `LlmError::AuthFailed` if it is not set.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| LlmError::AuthFailed {
            provider: format!("anthropic (env var '{}' not set)", config.api_key_env),
        })?;
        Ok(Self::new_with_key(config, api_key))
    }

    /// Create a new provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            context_window: config.context_window,
            timeout_secs: config.timeout_secs,
        }
    }

    /// Build the JSON request body for the Messages API.
    ///
    /// System messages are extracted from the messages list and concatenated
    /// into the top-level `system` field.
    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let max_tokens = request.max_tokens.unwrap_or(self.max_tokens);

        let (system_text, non_system) = Self::extract_system_message(&request.messages);

        let messages_json: Vec<Value> = non_system.iter().map(|m| Self::message_to_json(m)).collect();

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": max_tokens,
            "temperature": request.temperature.unwrap_or(self.temperature),
            "messages": messages_json,
        });

        if let Some(system) = &system_text {
            body["system"] = Value::String(system.clone());
        }

        if !request.stop_sequences.is_empty() {
            body["stop_sequences"] = serde_json::json!(request.stop_sequences);
        }

        if let Some(tools) = &request.tools {
            let tools_json: Vec<Value> = tools.iter().map(Self::tool_definition_to_json).collect();
            body["tools"] = Value::Array(tools_json);
        }

        if let Some(choice) = &request.tool_choice {
            body["tool_choice"] = Self::tool_choice_to_json(choice);
        }

        body
    }

    /// Extract system messages from the messages list.
    ///
    /// Returns (optional concatenated system text, non-system messages).
    fn extract_system_message(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut non_system: Vec<&Message> = Vec::new();

        for msg in messages {
            if msg.role == Role::System {
                if let Some(text) = msg.content.as_text() {
                    system_parts.push(text);
                }
            } else {
                non_system.push(msg);
            }
        }

        let system_text = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system_text, non_system)
    }

    /// Convert a single `Message` to Anthropic JSON format.
    fn message_to_json(msg: &Message) -> Value {
        let role = match msg.role {
            Role::Assistant => "assistant",
            // System messages are extracted before this point.
            Role::User | Role::System => "user",
        };
        serde_json::json!({
            "role": role,
            "content": Self::content_to_blocks(&msg.content),
        })
    }

    /// Convert a `Content` value to an array of Anthropic content blocks.
    fn content_to_blocks(content: &Content) -> Value {
        match content {
            Content::Text { text } => serde_json::json!([{
                "type": "text",
                "text": text,
            }]),
            Content::ToolUse { id, name, input } => serde_json::json!([{
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": input,
            }]),
            Content::MultiPart { parts } => {
                let blocks: Vec<Value> = parts
                    .iter()
                    .flat_map(|part| match Self::content_to_blocks(part) {
                        Value::Array(arr) => arr,
                        other => vec![other],
                    })
                    .collect();
                Value::Array(blocks)
            }
        }
    }

    /// Convert a `ToolDefinition` to Anthropic tool JSON format.
    fn tool_definition_to_json(tool: &ToolDefinition) -> Value {
        serde_json::json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.input_schema,
        })
    }

    /// Convert a `ToolChoice` to Anthropic tool_choice JSON format.
    fn tool_choice_to_json(choice: &ToolChoice) -> Value {
        match choice {
            ToolChoice::Auto => serde_json::json!({"type": "auto"}),
            ToolChoice::Any => serde_json::json!({"type": "any"}),
            ToolChoice::Tool { name } => serde_json::json!({"type": "tool", "name": name}),
        }
    }

    /// Parse a Messages API response into a `CompletionResponse`.
    fn parse_response(body: &Value) -> Result<CompletionResponse, LlmError> {
        let model = body["model"].as_str().unwrap_or("unknown").to_string();
        let stop_reason = body["stop_reason"].as_str().map(|s| s.to_string());
        let usage = TokenUsage {
            input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize,
            output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize,
        };

        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing 'content' array in response".to_string(),
            })?;

        let content = Self::parse_content_blocks(blocks);
        let message = Message::new(Role::Assistant, content);

        Ok(CompletionResponse {
            message,
            usage,
            model,
            stop_reason,
        })
    }

    /// Parse an array of Anthropic content blocks into a `Content` value.
    ///
    /// A single block is returned directly; multiple blocks become
    /// `Content::MultiPart`. Unknown block types are skipped.
    fn parse_content_blocks(blocks: &[Value]) -> Content {
        let mut parts: Vec<Content> = Vec::new();

        for block in blocks {
            match block["type"].as_str().unwrap_or("text") {
                "text" => {
                    let text = block["text"].as_str().unwrap_or("").to_string();
                    parts.push(Content::Text { text });
                }
                "tool_use" => {
                    parts.push(Content::ToolUse {
                        id: block["id"].as_str().unwrap_or("").to_string(),
                        name: block["name"].as_str().unwrap_or("").to_string(),
                        input: block["input"].clone(),
                    });
                }
                other => {
                    debug!(block_type = other, "Ignoring unknown content block type");
                }
            }
        }

        match parts.len() {
            0 => Content::text(""),
            1 => parts.into_iter().next().unwrap(),
            _ => Content::MultiPart { parts },
        }
    }

    /// Map an HTTP status code to the appropriate `LlmError`.
    fn map_http_error(status: reqwest::StatusCode, body_text: &str, timeout_secs: u64) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthFailed {
                provider: "anthropic".to_string(),
            },
            408 => LlmError::Timeout { timeout_secs },
            429 => {
                let retry_after = serde_json::from_str::<Value>(body_text)
                    .ok()
                    .and_then(|v| v["error"]["retry_after_secs"].as_u64())
                    .unwrap_or(30);
                LlmError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            _ => LlmError::ApiRequest {
                message: format!("HTTP {} from Anthropic API: {}", status, body_text),
            },
        }
    }

    /// Map a transport-level failure to the appropriate `LlmError`.
    fn map_transport_error(e: reqwest::Error, timeout_secs: u64) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout { timeout_secs }
        } else if e.is_connect() {
            LlmError::Connection {
                message: e.to_string(),
            }
        } else {
            LlmError::ApiRequest {
                message: format!("Request to Anthropic API failed: {}", e),
            }
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request_body(&request);
        let url = format!("{}/messages", self.base_url);

        debug!(
            model = self.model.as_str(),
            url = url.as_str(),
            "Sending Anthropic completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_transport_error(e, self.timeout_secs))?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text, self.timeout_secs));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn max_context_tokens(&self) -> usize {
        self.context_window
    }
}
