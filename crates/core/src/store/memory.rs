use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ConversationStore, StoreError, next_message_timestamp};
use crate::conversation::{
    Conversation, ConversationId, DebugLog, Message, MessageId, NewMessage,
};

#[derive(Default)]
struct State {
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    debug_logs: HashMap<ConversationId, Vec<DebugLog>>,
}

/// A [`ConversationStore`] that keeps everything in memory.
///
/// Nothing survives the process, which makes it suitable for tests and
/// one-off sessions.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // The state is never left half-updated, so a poisoned lock is still
        // usable.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn newest_first(
    conversations: impl Iterator<Item = Conversation>,
    limit: usize,
) -> Vec<Conversation> {
    let mut conversations: Vec<_> = conversations.collect();
    conversations.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
    conversations.truncate(limit);
    conversations
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(
        &self,
        user_name: &str,
        project_name: &str,
        title: &str,
    ) -> Result<Conversation, StoreError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::random(),
            user_name: user_name.to_owned(),
            project_name: project_name.to_owned(),
            title: title.to_owned(),
            created_at: now,
            last_updated_at: now,
        };
        let mut state = self.lock();
        state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        state.messages.insert(conversation.id.clone(), Vec::new());
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        Ok(self.lock().conversations.get(id).cloned())
    }

    async fn update_conversation(
        &self,
        id: &ConversationId,
        title: &str,
        last_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let conversation = state
            .conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::ConversationNotFound(id.clone()))?;
        conversation.title = title.to_owned();
        conversation.last_updated_at = last_updated_at;
        Ok(())
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        message: NewMessage,
    ) -> Result<Message, StoreError> {
        let mut state = self.lock();
        let messages = state
            .messages
            .get_mut(id)
            .ok_or_else(|| StoreError::ConversationNotFound(id.clone()))?;
        let timestamp = next_message_timestamp(
            messages.last().map(|m| m.timestamp),
            Utc::now(),
        );
        let message = Message {
            id: MessageId::random(),
            conversation_id: id.clone(),
            role: message.role(),
            content: message.content,
            usage: message.usage,
            timestamp,
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn load_history(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        self.lock()
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::ConversationNotFound(id.clone()))
    }

    async fn count_messages(
        &self,
        id: &ConversationId,
    ) -> Result<usize, StoreError> {
        self.lock()
            .messages
            .get(id)
            .map(Vec::len)
            .ok_or_else(|| StoreError::ConversationNotFound(id.clone()))
    }

    async fn list_by_user(
        &self,
        user_name: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError> {
        let state = self.lock();
        let matched = state
            .conversations
            .values()
            .filter(|c| c.user_name == user_name)
            .cloned();
        Ok(newest_first(matched, limit))
    }

    async fn list_by_project(
        &self,
        project_name: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError> {
        let state = self.lock();
        let matched = state
            .conversations
            .values()
            .filter(|c| c.project_name == project_name)
            .cloned();
        Ok(newest_first(matched, limit))
    }

    async fn append_debug_log(&self, log: DebugLog) -> Result<(), StoreError> {
        let mut state = self.lock();
        let known = state
            .messages
            .get(&log.conversation_id)
            .ok_or_else(|| {
                StoreError::ConversationNotFound(log.conversation_id.clone())
            })?
            .iter()
            .any(|m| m.id == log.message_id);
        if !known {
            return Err(StoreError::Corrupted(format!(
                "debug log {} refers to unknown message {}",
                log.id, log.message_id
            )));
        }
        state
            .debug_logs
            .entry(log.conversation_id.clone())
            .or_default()
            .push(log);
        Ok(())
    }

    async fn list_debug_logs(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<DebugLog>, StoreError> {
        let state = self.lock();
        if !state.conversations.contains_key(id) {
            return Err(StoreError::ConversationNotFound(id.clone()));
        }
        Ok(state.debug_logs.get(id).cloned().unwrap_or_default())
    }
}
