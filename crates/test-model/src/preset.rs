use iai_model::{ContentBlock, ErrorKind, Usage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of failure a preset response simulates.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PresetFailure {
    #[default]
    Transport,
    RateLimited,
    InvalidRequest,
    MalformedResponse,
}

impl From<PresetFailure> for ErrorKind {
    fn from(value: PresetFailure) -> Self {
        match value {
            PresetFailure::Transport => ErrorKind::Transport,
            PresetFailure::RateLimited => ErrorKind::RateLimited,
            PresetFailure::InvalidRequest => ErrorKind::InvalidRequest,
            PresetFailure::MalformedResponse => ErrorKind::MalformedResponse,
        }
    }
}

/// The preset response for an assistant step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Content blocks in this response.
    pub blocks: Vec<ContentBlock>,
    /// Usage reported with this response.
    #[serde(default)]
    pub usage: Usage,
    /// If set, the request will fail in the first `failure` attempts.
    /// `Some(0)` means the request will fail infinitely.
    pub failures: Option<u64>,
    /// What the simulated failures look like.
    #[serde(default)]
    pub failure: PresetFailure,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified blocks.
    #[inline]
    pub fn with_blocks(blocks: impl Into<Vec<ContentBlock>>) -> Self {
        Self {
            blocks: blocks.into(),
            usage: Usage::default(),
            failures: None,
            failure: PresetFailure::default(),
        }
    }

    /// Creates a text-only `PresetResponse`.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::with_blocks([text_block(text)])
    }

    /// Sets the usage reported by this response.
    #[inline]
    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = Usage::new(input_tokens, output_tokens);
        self
    }

    /// Sets failure times before a successful response. `0` means the
    /// response will always be a failure.
    #[inline]
    pub fn with_failures(mut self, failures: u64, kind: PresetFailure) -> Self {
        self.failures = Some(failures);
        self.failure = kind;
        self
    }
}

/// Shorthand for a text block.
#[inline]
pub fn text_block<S: Into<String>>(text: S) -> ContentBlock {
    ContentBlock::Text { text: text.into() }
}

/// Shorthand for a tool use block.
#[inline]
pub fn tool_use_block<S1: Into<String>, S2: Into<String>>(
    id: S1,
    name: S2,
    input: Value,
) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.into(),
        name: name.into(),
        input,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::with_blocks([
            text_block("I will look it up."),
            tool_use_block(
                "toolu_1",
                "get_project_info",
                json!({ "project_name": "aimee" }),
            ),
        ])
        .with_usage(12, 7)
        .with_failures(2, PresetFailure::RateLimited);

        let serialized = serde_json::to_string(&response).unwrap();
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(response, deserialized);
    }
}
