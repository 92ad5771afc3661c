//! Conversation-related types.
//!
//! A conversation is an ordered, append-only list of [`Message`]s. Messages
//! are the durable form of the exchange: user input, assistant replies (one
//! per model call) and tool results (one per tool invocation). They are
//! converted back into model-facing messages by [`to_model_messages`].

use std::collections::HashSet;
use std::fmt::{self, Display};
use std::iter;

use chrono::{DateTime, Utc};
use iai_model::{ContentBlock, ModelMessage, Role, Usage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const MAX_TITLE_CHARS: usize = 50;
const TITLE_ELLIPSIS: &str = "...";

/// Opaque identifier of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

/// Opaque identifier of a message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

/// Opaque identifier of a debug log entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebugLogId(String);

macro_rules! impl_id {
    ($ty:ident) => {
        impl $ty {
            /// Generates a new random identifier.
            #[inline]
            pub fn random() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $ty {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $ty {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

impl_id!(ConversationId);
impl_id!(MessageId);
impl_id!(DebugLogId);

/// Metadata of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier.
    pub id: ConversationId,
    /// The user who owns the conversation.
    pub user_name: String,
    /// The project the conversation is scoped to.
    pub project_name: String,
    /// Human-readable title, empty until the first turn.
    pub title: String,
    /// When the conversation was created.
    pub created_at: DateTime<Utc>,
    /// When the conversation was last touched by a turn.
    pub last_updated_at: DateTime<Utc>,
}

/// The role of a persisted message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Input from the user.
    User,
    /// A reply from the model.
    Assistant,
    /// The result of a tool invocation.
    Tool,
}

impl MessageRole {
    /// Returns the storage name of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }

    /// Parses a role from its storage name.
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            "tool" => MessageRole::Tool,
            _ => return None,
        })
    }
}

impl Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured content of a persisted message.
///
/// It's serialized as JSON with a `kind` tag when stored, and read back
/// losslessly, including tool use ids and inputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text typed by the user.
    Text {
        /// The text.
        text: String,
    },
    /// All content blocks of one model reply.
    Assistant {
        /// Blocks in the order the model emitted them.
        blocks: Vec<ContentBlock>,
    },
    /// The result of one tool invocation.
    ToolResult {
        /// Id of the tool use this result answers.
        tool_use_id: String,
        /// Name of the invoked tool.
        tool_name: String,
        /// Serialized result payload.
        content: String,
        /// Whether the invocation failed.
        #[serde(default)]
        is_error: bool,
    },
    /// A condensed account of earlier messages, written by the model when
    /// the history grew too large. It travels to the model as user text.
    Summary {
        /// The summary text.
        summary: String,
        /// Number of messages the summary replaces.
        condensed: usize,
        /// The oldest message kept verbatim next to the summary.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        first_kept: Option<MessageId>,
    },
}

impl MessageContent {
    /// Returns the role that carries this kind of content.
    pub fn role(&self) -> MessageRole {
        match self {
            MessageContent::Text { .. } | MessageContent::Summary { .. } => {
                MessageRole::User
            }
            MessageContent::Assistant { .. } => MessageRole::Assistant,
            MessageContent::ToolResult { .. } => MessageRole::Tool,
        }
    }

    /// Returns the human-readable text of this content.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text { text } => text.clone(),
            MessageContent::Assistant { blocks } => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
            MessageContent::ToolResult { content, .. } => content.clone(),
            MessageContent::Summary {
                summary, condensed, ..
            } => format!(
                "[CONVERSATION SUMMARY - Previous {condensed} messages \
                 condensed]\n\n{summary}"
            ),
        }
    }

    /// Returns whether this is a history summary.
    #[inline]
    pub fn is_summary(&self) -> bool {
        matches!(self, MessageContent::Summary { .. })
    }
}

/// A message that is about to be appended to a conversation.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMessage {
    /// Content of the message, which also determines its role.
    pub content: MessageContent,
    /// Token usage, only present on assistant messages.
    pub usage: Option<Usage>,
}

impl NewMessage {
    /// Creates a user message.
    #[inline]
    pub fn user<S: Into<String>>(text: S) -> Self {
        Self {
            content: MessageContent::Text { text: text.into() },
            usage: None,
        }
    }

    /// Creates an assistant message from the blocks of one model reply.
    #[inline]
    pub fn assistant(blocks: Vec<ContentBlock>, usage: Usage) -> Self {
        Self {
            content: MessageContent::Assistant { blocks },
            usage: Some(usage),
        }
    }

    /// Creates a tool result message.
    #[inline]
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            content: MessageContent::ToolResult {
                tool_use_id: tool_use_id.into(),
                tool_name: tool_name.into(),
                content: content.into(),
                is_error,
            },
            usage: None,
        }
    }

    /// Creates a summary replacing `condensed` earlier messages.
    #[inline]
    pub fn summary(
        summary: impl Into<String>,
        condensed: usize,
        first_kept: Option<MessageId>,
    ) -> Self {
        Self {
            content: MessageContent::Summary {
                summary: summary.into(),
                condensed,
                first_kept,
            },
            usage: None,
        }
    }

    /// Returns the role of this message.
    #[inline]
    pub fn role(&self) -> MessageRole {
        self.content.role()
    }
}

/// A persisted message.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// The conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Role of the message.
    pub role: MessageRole,
    /// Structured content.
    pub content: MessageContent,
    /// Token usage of the model call that produced this message.
    pub usage: Option<Usage>,
    /// Strictly increasing within a conversation.
    pub timestamp: DateTime<Utc>,
}

/// The request and response of one model call, kept for troubleshooting.
#[derive(Clone, Debug, PartialEq)]
pub struct DebugLog {
    /// Unique identifier.
    pub id: DebugLogId,
    /// The conversation the call was made for.
    pub conversation_id: ConversationId,
    /// The assistant message persisted from the response.
    pub message_id: MessageId,
    /// The request as sent to the model provider.
    pub request: Value,
    /// The response as received from the model provider.
    pub response: Value,
    /// When the response was recorded.
    pub timestamp: DateTime<Utc>,
}

/// A tool invocation made during a turn.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocation {
    /// Id of the tool use block.
    pub tool_use_id: String,
    /// Name of the invoked tool.
    pub name: String,
    /// Arguments supplied by the model.
    pub input: Value,
    /// The assistant message that requested the invocation.
    pub assistant_message_id: MessageId,
    /// Whether the invocation produced an error result.
    pub is_error: bool,
}

/// How a turn ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TurnStatus {
    /// The model replied without requesting any tool.
    Completed,
    /// The tool iteration limit was reached before the model finished.
    TruncatedByIterationLimit,
}

/// The outcome of a successful turn.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnResult {
    /// How the turn ended.
    pub status: TurnStatus,
    /// Final assistant text. On truncation it's the last non-empty text the
    /// model produced during the turn.
    pub text: String,
    /// Usage aggregated across every model call of the turn.
    pub usage: Usage,
    /// Every tool invocation, in execution order.
    pub tool_invocations: Vec<ToolInvocation>,
    /// Number of tool rounds executed.
    pub iterations: u32,
}

/// Derives a conversation title from the first user message.
///
/// Titles longer than 50 characters are cut to 47 characters followed by
/// an ellipsis.
pub fn title_from_message(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= MAX_TITLE_CHARS {
        return text.to_owned();
    }
    let mut title: String = text
        .chars()
        .take(MAX_TITLE_CHARS - TITLE_ELLIPSIS.len())
        .collect();
    title.push_str(TITLE_ELLIPSIS);
    title
}

/// Returns the most recent `max_messages` messages of a history, advanced
/// to the first user message so the window never opens on an orphaned
/// assistant reply or tool result.
pub fn history_window(messages: &[Message], max_messages: usize) -> &[Message] {
    let start = messages.len().saturating_sub(max_messages);
    let window = &messages[start..];
    match window.iter().position(|m| m.role == MessageRole::User) {
        Some(first_user) => &window[first_user..],
        None => &[],
    }
}

/// Returns the messages a turn sends to the model as history.
///
/// Without a summary this is the [`history_window`]. Otherwise it starts
/// with the latest summary, followed by the messages that summary kept and
/// everything appended after it, capped at `max_messages` in total.
pub fn working_history(
    messages: &[Message],
    max_messages: usize,
) -> Vec<Message> {
    let Some(idx) = messages.iter().rposition(|m| m.content.is_summary())
    else {
        return history_window(messages, max_messages).to_vec();
    };
    let summary = &messages[idx];
    let kept_from = match &summary.content {
        MessageContent::Summary {
            first_kept: Some(first_kept),
            ..
        } => messages[..idx]
            .iter()
            .position(|m| &m.id == first_kept)
            .unwrap_or(idx),
        _ => idx,
    };

    // Older summaries between the kept messages were condensed again.
    let mut rest: Vec<&Message> = messages[kept_from..idx]
        .iter()
        .filter(|m| !m.content.is_summary())
        .chain(&messages[idx + 1..])
        .collect();
    let excess = rest.len().saturating_sub(max_messages.saturating_sub(1));
    rest.drain(..excess);
    iter::once(summary).chain(rest).cloned().collect()
}

/// Converts persisted messages into the alternating message list the model
/// expects.
///
/// Consecutive tool results are grouped into a single user message. A tool
/// use without a matching result (or a result without a matching use) is
/// dropped, so an interrupted turn never produces an invalid request.
pub fn to_model_messages(messages: &[Message]) -> Vec<ModelMessage> {
    let mut requested = HashSet::new();
    let mut answered = HashSet::new();
    for msg in messages {
        match &msg.content {
            MessageContent::Assistant { blocks } => {
                for block in blocks {
                    if let ContentBlock::ToolUse { id, .. } = block {
                        requested.insert(id.as_str());
                    }
                }
            }
            MessageContent::ToolResult { tool_use_id, .. } => {
                answered.insert(tool_use_id.as_str());
            }
            MessageContent::Text { .. } | MessageContent::Summary { .. } => {}
        }
    }

    let mut model_messages: Vec<ModelMessage> = Vec::new();
    for msg in messages {
        let (role, blocks) = match &msg.content {
            MessageContent::Text { text } => (
                Role::User,
                vec![ContentBlock::Text { text: text.clone() }],
            ),
            content @ MessageContent::Summary { .. } => (
                Role::User,
                vec![ContentBlock::Text {
                    text: content.text(),
                }],
            ),
            MessageContent::Assistant { blocks } => (
                Role::Assistant,
                blocks
                    .iter()
                    .filter(|block| match block {
                        ContentBlock::ToolUse { id, .. } => {
                            answered.contains(id.as_str())
                        }
                        _ => true,
                    })
                    .cloned()
                    .collect(),
            ),
            MessageContent::ToolResult {
                tool_use_id,
                content,
                is_error,
                ..
            } => {
                if !requested.contains(tool_use_id.as_str()) {
                    continue;
                }
                (
                    Role::User,
                    vec![ContentBlock::ToolResult {
                        tool_use_id: tool_use_id.clone(),
                        content: content.clone(),
                        is_error: *is_error,
                    }],
                )
            }
        };
        push_blocks(&mut model_messages, role, blocks);
    }

    // The model expects the exchange to open with a user message.
    let first_user = model_messages
        .iter()
        .position(|m| m.role == Role::User)
        .unwrap_or(model_messages.len());
    model_messages.drain(..first_user);
    model_messages
}

/// Appends blocks to the message list, merging them into the last message
/// if it has the same role.
pub(crate) fn push_blocks(
    messages: &mut Vec<ModelMessage>,
    role: Role,
    blocks: Vec<ContentBlock>,
) {
    let blocks: Vec<_> = blocks
        .into_iter()
        .filter(|block| match block {
            ContentBlock::Text { text } => !text.is_empty(),
            _ => true,
        })
        .collect();
    if blocks.is_empty() {
        return;
    }
    match messages.last_mut() {
        Some(last) if last.role == role => last.content.extend(blocks),
        _ => messages.push(ModelMessage {
            role,
            content: blocks,
        }),
    }
}
