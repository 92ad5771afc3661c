use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The system instructions.
    pub system: Option<String>,
    /// The input messages, the first one must come from the user.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model.
    pub tools: Vec<ModelTool>,
    /// Caps the output tokens of this request, overriding the provider
    /// default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// The author of a message.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human side, which also carries tool results back to the model.
    User,
    /// The model side.
    Assistant,
}

/// A complete message in the model history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    /// Who authored the message.
    pub role: Role,
    /// Ordered content blocks.
    pub content: Vec<ContentBlock>,
}

impl ModelMessage {
    /// Creates a user message with a single text block.
    #[inline]
    pub fn user_text<S: Into<String>>(text: S) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }
}

/// A typed piece of message content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// A request from the model to invoke a tool.
    ToolUse {
        /// The unique identifier for the tool use request.
        id: String,
        /// The name of the tool to call.
        name: String,
        /// Structured arguments for the tool.
        input: Value,
    },
    /// The outcome of a tool use, fed back to the model.
    ToolResult {
        /// Identifier of the originating tool use block.
        tool_use_id: String,
        /// The serialized result payload.
        content: String,
        /// Whether the payload describes a failure.
        #[serde(default)]
        is_error: bool,
    },
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Input definition of the tool, typically a
    /// [JSON schema](https://json-schema.org/) object.
    pub input_schema: Value,
}
