use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::ContentBlock;

/// A complete response from the model provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Ordered content blocks, text and/or tool use requests.
    pub content: Vec<ContentBlock>,
    /// Token usage of this call.
    pub usage: Usage,
    /// Why the model stopped generating, if the provider reported it.
    pub stop_reason: Option<StopReason>,
}

impl ModelResponse {
    /// Concatenates all text blocks in order.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text: part } = block {
                text.push_str(part);
            }
        }
        text
    }

    /// Returns the tool use requests in the order the model emitted them.
    pub fn tool_uses(&self) -> Vec<ToolUse> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Returns `true` if the response requests at least one tool.
    #[inline]
    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }
}

/// Describes a tool use request from the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    /// The unique identifier for the tool use request.
    pub id: String,
    /// The name of the tool to call.
    pub name: String,
    /// Structured arguments to pass to the tool.
    pub input: Value,
}

/// The reason why a model response has finished.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model finished its answer.
    EndTurn,
    /// The model needs to call a tool.
    ToolUse,
    /// The output hit the token limit.
    MaxTokens,
    /// A stop sequence was generated.
    StopSequence,
}

/// Token counts of one or more model calls.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct Usage {
    /// Tokens consumed by the request.
    pub input_tokens: u64,
    /// Tokens generated by the model.
    pub output_tokens: u64,
}

impl Usage {
    /// Creates a usage record.
    #[inline]
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

impl Add for Usage {
    type Output = Usage;

    #[inline]
    fn add(self, rhs: Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl AddAssign for Usage {
    #[inline]
    fn add_assign(&mut self, rhs: Usage) {
        *self = *self + rhs;
    }
}
