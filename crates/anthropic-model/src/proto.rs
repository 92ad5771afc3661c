use iai_model::{
    ContentBlock, ModelMessage, ModelRequest, ModelResponse, ModelTool, Role,
    StopReason, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AnthropicConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct ResponseUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ResponseBlock>,
    pub usage: ResponseUsage,
    pub stop_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Tool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<RequestBlock>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(
    req: &ModelRequest,
    config: &AnthropicConfig,
) -> MessagesRequest {
    MessagesRequest {
        model: config.model.clone(),
        max_tokens: req.max_tokens.unwrap_or(config.max_tokens),
        system: req.system.clone().filter(|system| !system.is_empty()),
        messages: req.messages.iter().map(create_message).collect(),
        tools: req.tools.iter().map(create_tool).collect(),
    }
}

#[inline]
fn create_message(msg: &ModelMessage) -> Message {
    Message {
        role: match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        },
        content: msg.content.iter().map(create_block).collect(),
    }
}

#[inline]
fn create_block(block: &ContentBlock) -> RequestBlock {
    match block {
        ContentBlock::Text { text } => RequestBlock::Text { text: text.clone() },
        ContentBlock::ToolUse { id, name, input } => RequestBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => RequestBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: content.clone(),
            is_error: *is_error,
        },
    }
}

#[inline]
fn create_tool(tool: &ModelTool) -> Tool {
    Tool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.input_schema.clone(),
    }
}

pub fn convert_response(resp: MessagesResponse) -> ModelResponse {
    let content = resp
        .content
        .into_iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(ContentBlock::Text { text }),
            ResponseBlock::ToolUse { id, name, input } => {
                Some(ContentBlock::ToolUse { id, name, input })
            }
            ResponseBlock::Unknown => {
                debug!("skipping an unsupported content block");
                None
            }
        })
        .collect();
    let stop_reason = resp.stop_reason.as_deref().and_then(|reason| {
        Some(match reason {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            _ => return None,
        })
    });
    ModelResponse {
        content,
        usage: Usage::new(resp.usage.input_tokens, resp.usage.output_tokens),
        stop_reason,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::AnthropicConfigBuilder;

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            max_tokens: None,
            system: Some("You are Ignition AI.".to_owned()),
            messages: vec![
                ModelMessage::user_text("What is this project about?"),
                ModelMessage {
                    role: Role::Assistant,
                    content: vec![ContentBlock::ToolUse {
                        id: "toolu_1".to_owned(),
                        name: "get_project_info".to_owned(),
                        input: json!({ "project_name": "aimee" }),
                    }],
                },
                ModelMessage {
                    role: Role::User,
                    content: vec![ContentBlock::ToolResult {
                        tool_use_id: "toolu_1".to_owned(),
                        content: "{\"title\":\"AIMEE\"}".to_owned(),
                        is_error: false,
                    }],
                },
            ],
            tools: vec![ModelTool {
                name: "get_project_info".to_owned(),
                description: "Get information about the Ignition project"
                    .to_owned(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "project_name": { "type": "string" }
                    },
                    "required": ["project_name"]
                }),
            }],
        };
        let config = AnthropicConfigBuilder::with_api_key("xxx")
            .with_model("custom")
            .build();

        let body =
            serde_json::to_value(create_request(&request, &config)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "custom",
                "max_tokens": 4096,
                "system": "You are Ignition AI.",
                "messages": [
                    {
                        "role": "user",
                        "content": [
                            { "type": "text", "text": "What is this project about?" }
                        ]
                    },
                    {
                        "role": "assistant",
                        "content": [{
                            "type": "tool_use",
                            "id": "toolu_1",
                            "name": "get_project_info",
                            "input": { "project_name": "aimee" }
                        }]
                    },
                    {
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": "toolu_1",
                            "content": "{\"title\":\"AIMEE\"}"
                        }]
                    }
                ],
                "tools": [{
                    "name": "get_project_info",
                    "description": "Get information about the Ignition project",
                    "input_schema": {
                        "type": "object",
                        "properties": {
                            "project_name": { "type": "string" }
                        },
                        "required": ["project_name"]
                    }
                }]
            })
        );
    }

    #[test]
    fn test_empty_system_and_tools_are_omitted() {
        let request = ModelRequest {
            max_tokens: None,
            system: Some(String::new()),
            messages: vec![ModelMessage::user_text("Hi")],
            tools: vec![],
        };
        let config = AnthropicConfigBuilder::with_api_key("xxx").build();
        let body =
            serde_json::to_value(create_request(&request, &config)).unwrap();
        assert!(body.get("system").is_none());
        assert!(body.get("tools").is_none());
        assert_eq!(body["max_tokens"], 4096);

        let request = ModelRequest {
            max_tokens: Some(2000),
            ..request
        };
        let body =
            serde_json::to_value(create_request(&request, &config)).unwrap();
        assert_eq!(body["max_tokens"], 2000);
    }

    #[test]
    fn test_convert_response() {
        let resp: MessagesResponse = serde_json::from_value(json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [
                { "type": "thinking", "thinking": "hmm" },
                { "type": "text", "text": "Let me check." },
                {
                    "type": "tool_use",
                    "id": "toolu_1",
                    "name": "get_project_info",
                    "input": { "project_name": "aimee" }
                }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 50, "output_tokens": 30 }
        }))
        .unwrap();

        let resp = convert_response(resp);
        assert_eq!(resp.content.len(), 2);
        assert_eq!(resp.text(), "Let me check.");
        assert_eq!(resp.usage, Usage::new(50, 30));
        assert_eq!(resp.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(resp.tool_uses()[0].name, "get_project_info");
    }
}
