//! Core type definitions for ragkit.
//!
//! Defines the request/response types shared by the generation provider,
//! the rerankers, and the structured-output extractor: conversation roles,
//! message content (including tool-use blocks), and completion payloads.

use serde::{Deserialize, Serialize};

/// Represents a participant role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Content within a message — plain text, a tool-use block, or a mix of both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    MultiPart {
        parts: Vec<Content>,
    },
}

impl Content {
    /// Create a simple text content.
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    /// Create a tool-use content block.
    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Content::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// Returns the text if this content is a plain text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    /// Create a new message.
    pub fn new(role: Role, content: Content) -> Self {
        Self { role, content }
    }

    /// Create a system message with text content.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, Content::text(text))
    }

    /// Create a user message with text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Content::text(text))
    }

    /// Create an assistant message with text content.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Content::text(text))
    }

    /// Returns the text content of this message, if it is plain text.
    pub fn as_text(&self) -> Option<&str> {
        self.content.as_text()
    }
}

/// A tool definition handed verbatim to the generation API.
///
/// `input_schema` is a JSON Schema object describing the tool's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// How the model should choose among the provided tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides whether to use a tool.
    Auto,
    /// The model must use one of the provided tools.
    Any,
    /// The model must use the named tool.
    Tool { name: String },
}

/// A request for a single (non-streaming) completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: Option<ToolChoice>,
    /// Sampling temperature. `None` uses the provider's configured default.
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    /// Per-request model override. `None` uses the provider's configured model.
    pub model: Option<String>,
}

impl CompletionRequest {
    /// Create a request with the given messages; sampling settings default to
    /// the provider's configured values.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: None,
            tool_choice: None,
            temperature: None,
            max_tokens: None,
            stop_sequences: Vec::new(),
            model: None,
        }
    }
}

/// Token usage reported by the generation API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// The result of a completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub message: Message,
    pub usage: TokenUsage,
    pub model: String,
    pub stop_reason: Option<String>,
}

impl CompletionResponse {
    /// Concatenated text of all text blocks in the response.
    pub fn text(&self) -> String {
        fn collect(content: &Content, out: &mut String) {
            match content {
                Content::Text { text } => out.push_str(text),
                Content::MultiPart { parts } => {
                    for part in parts {
                        collect(part, out);
                    }
                }
                Content::ToolUse { .. } => {}
            }
        }
        let mut out = String::new();
        collect(&self.message.content, &mut out);
        out
    }

    /// The first tool-use block in the response, as `(id, name, input)`.
    pub fn tool_use(&self) -> Option<(&str, &str, &serde_json::Value)> {
        fn find(content: &Content) -> Option<(&str, &str, &serde_json::Value)> {
            match content {
                Content::ToolUse { id, name, input } => Some((id, name, input)),
                Content::MultiPart { parts } => parts.iter().find_map(find),
                Content::Text { .. } => None,
            }
        }
        find(&self.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_constructors() {
        let msg = Message::system("be brief");
        assert_eq!(msg.role, Role::System);
        assert_eq!(msg.as_text(), Some("be brief"));

        let msg = Message::user("hello");
        assert_eq!(msg.role, Role::User);

        let msg = Message::assistant("hi");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.as_text(), Some("hi"));
    }

    #[test]
    fn test_content_tool_use_has_no_text() {
        let content = Content::tool_use("tu_1", "record_fact", serde_json::json!({"k": "v"}));
        assert!(content.as_text().is_none());
    }

    #[test]
    fn test_role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn test_response_text_concatenates_multipart() {
        let response = CompletionResponse {
            message: Message::new(
                Role::Assistant,
                Content::MultiPart {
                    parts: vec![
                        Content::text("part one. "),
                        Content::tool_use("tu_1", "lookup", serde_json::json!({})),
                        Content::text("part two."),
                    ],
                },
            ),
            usage: TokenUsage::default(),
            model: "test".into(),
            stop_reason: None,
        };
        assert_eq!(response.text(), "part one. part two.");
    }

    #[test]
    fn test_response_tool_use_finds_nested_block() {
        let response = CompletionResponse {
            message: Message::new(
                Role::Assistant,
                Content::MultiPart {
                    parts: vec![
                        Content::text("calling a tool"),
                        Content::tool_use("tu_42", "expand", serde_json::json!({"n": 3})),
                    ],
                },
            ),
            usage: TokenUsage::default(),
            model: "test".into(),
            stop_reason: Some("tool_use".into()),
        };
        let (id, name, input) = response.tool_use().expect("tool use block");
        assert_eq!(id, "tu_42");
        assert_eq!(name, "expand");
        assert_eq!(input["n"], 3);
    }

    #[test]
    fn test_response_tool_use_absent() {
        let response = CompletionResponse {
            message: Message::assistant("just text"),
            usage: TokenUsage::default(),
            model: "test".into(),
            stop_reason: Some("end_turn".into()),
        };
        assert!(response.tool_use().is_none());
    }
}
