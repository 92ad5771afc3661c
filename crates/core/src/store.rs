//! Durable storage of conversations and their messages.

mod memory;

use std::error::Error as StdError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::conversation::{
    Conversation, ConversationId, DebugLog, Message, NewMessage,
};

pub use memory::MemoryStore;

/// Errors returned by a [`ConversationStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The conversation doesn't exist.
    #[error("conversation `{0}` not found")]
    ConversationNotFound(ConversationId),
    /// A stored row couldn't be decoded.
    #[error("corrupted record: {0}")]
    Corrupted(String),
    /// The storage backend failed.
    #[error("storage backend failure: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

impl StoreError {
    /// Wraps a backend error.
    #[inline]
    pub fn backend<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

/// Storage for conversations and their ordered messages.
///
/// Implementations must keep messages in append order, and assign each
/// message a timestamp strictly greater than the previous one in the same
/// conversation. Appends to different conversations may run concurrently.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Creates an empty conversation.
    async fn create_conversation(
        &self,
        user_name: &str,
        project_name: &str,
        title: &str,
    ) -> Result<Conversation, StoreError>;

    /// Returns the conversation, or `None` if it doesn't exist.
    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Updates the title and the last-updated time of a conversation.
    async fn update_conversation(
        &self,
        id: &ConversationId,
        title: &str,
        last_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Appends a message and returns it as persisted.
    async fn append_message(
        &self,
        id: &ConversationId,
        message: NewMessage,
    ) -> Result<Message, StoreError>;

    /// Returns every message of the conversation in append order.
    async fn load_history(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<Message>, StoreError>;

    /// Returns the number of messages in the conversation.
    async fn count_messages(
        &self,
        id: &ConversationId,
    ) -> Result<usize, StoreError>;

    /// Lists the conversations of a user, most recently updated first.
    async fn list_by_user(
        &self,
        user_name: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError>;

    /// Lists the conversations of a project, most recently updated first.
    async fn list_by_project(
        &self,
        project_name: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError>;

    /// Records the request and response of one model call.
    ///
    /// The assistant message the log refers to must already be persisted.
    async fn append_debug_log(&self, log: DebugLog) -> Result<(), StoreError>;

    /// Returns the debug logs of a conversation in the order they were
    /// recorded.
    async fn list_debug_logs(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<DebugLog>, StoreError>;
}

/// Returns the timestamp for the next message of a conversation, which is
/// the current time unless the clock hasn't moved past the last message.
pub fn next_message_timestamp(
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    // Timestamps are persisted with millisecond precision.
    let now_ms = now.timestamp_millis();
    let ms = match last {
        Some(last) => now_ms.max(last.timestamp_millis() + 1),
        None => now_ms,
    };
    DateTime::from_timestamp_millis(ms).unwrap_or(now)
}
