use chrono::{DateTime, Utc};
use iai_core::conversation::{
    Conversation, DebugLog, Message, MessageContent, MessageRole,
};
use iai_core::store::StoreError;
use iai_model::Usage;
use rusqlite::Row;

/// Maps a row from the `iai_conversations` table.
pub(crate) struct ConversationRow {
    id: String,
    user_name: String,
    project_name: String,
    title: String,
    created_at: i64,
    last_updated_at: i64,
}

impl ConversationRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_name: row.get(1)?,
            project_name: row.get(2)?,
            title: row.get(3)?,
            created_at: row.get(4)?,
            last_updated_at: row.get(5)?,
        })
    }
}

/// Maps a row from the `iai_messages` table.
pub(crate) struct MessageRow {
    id: String,
    conversation_id: String,
    role: String,
    content: String,
    input_tokens: Option<i64>,
    output_tokens: Option<i64>,
    timestamp: i64,
}

impl MessageRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            role: row.get(2)?,
            content: row.get(3)?,
            input_tokens: row.get(4)?,
            output_tokens: row.get(5)?,
            timestamp: row.get(6)?,
        })
    }
}

/// Maps a row from the `iai_debug_logs` table.
pub(crate) struct DebugLogRow {
    id: String,
    conversation_id: String,
    message_id: String,
    request_json: String,
    response_json: String,
    timestamp: i64,
}

impl DebugLogRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            message_id: row.get(2)?,
            request_json: row.get(3)?,
            response_json: row.get(4)?,
            timestamp: row.get(5)?,
        })
    }
}

fn timestamp(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupted(format!("bad timestamp {ms}")))
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = StoreError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        Ok(Conversation {
            id: row.id.into(),
            user_name: row.user_name,
            project_name: row.project_name,
            title: row.title,
            created_at: timestamp(row.created_at)?,
            last_updated_at: timestamp(row.last_updated_at)?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let role = MessageRole::parse(&row.role).ok_or_else(|| {
            StoreError::Corrupted(format!(
                "message {} has unknown role `{}`",
                row.id, row.role
            ))
        })?;
        let content: MessageContent = serde_json::from_str(&row.content)
            .map_err(|err| {
                StoreError::Corrupted(format!(
                    "message {} has unreadable content: {err}",
                    row.id
                ))
            })?;
        let usage = match (row.input_tokens, row.output_tokens) {
            (Some(input), Some(output)) => {
                Some(Usage::new(input.max(0) as u64, output.max(0) as u64))
            }
            _ => None,
        };
        Ok(Message {
            id: row.id.into(),
            conversation_id: row.conversation_id.into(),
            role,
            content,
            usage,
            timestamp: timestamp(row.timestamp)?,
        })
    }
}

impl TryFrom<DebugLogRow> for DebugLog {
    type Error = StoreError;

    fn try_from(row: DebugLogRow) -> Result<Self, Self::Error> {
        let parse = |json: &str| {
            serde_json::from_str(json).map_err(|err| {
                StoreError::Corrupted(format!(
                    "debug log {} has unreadable JSON: {err}",
                    row.id
                ))
            })
        };
        Ok(DebugLog {
            request: parse(&row.request_json)?,
            response: parse(&row.response_json)?,
            id: row.id.into(),
            conversation_id: row.conversation_id.into(),
            message_id: row.message_id.into(),
            timestamp: timestamp(row.timestamp)?,
        })
    }
}
