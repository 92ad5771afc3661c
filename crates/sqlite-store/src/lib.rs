//! A [`ConversationStore`] backed by SQLite.
//!
//! Conversations live in `iai_conversations`, their messages in
//! `iai_messages` and the per-call debug logs in `iai_debug_logs`. Message
//! content is stored as JSON text, which keeps tool use ids and inputs
//! intact across restarts.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod row;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use iai_core::conversation::{
    Conversation, ConversationId, DebugLog, Message, MessageId, NewMessage,
};
use iai_core::store::{ConversationStore, StoreError, next_message_timestamp};
use rusqlite::{Connection, OptionalExtension, params};
use tokio::task::spawn_blocking;

use row::{ConversationRow, DebugLogRow, MessageRow};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS iai_conversations (
    id TEXT PRIMARY KEY,
    user_name TEXT NOT NULL,
    project_name TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    last_updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_iai_conversations_user
    ON iai_conversations(user_name, last_updated_at DESC);
CREATE INDEX IF NOT EXISTS idx_iai_conversations_project
    ON iai_conversations(project_name, last_updated_at DESC);

CREATE TABLE IF NOT EXISTS iai_messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    input_tokens INTEGER,
    output_tokens INTEGER,
    timestamp INTEGER NOT NULL,
    FOREIGN KEY (conversation_id)
        REFERENCES iai_conversations(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_iai_messages_conversation
    ON iai_messages(conversation_id, timestamp);

CREATE TABLE IF NOT EXISTS iai_debug_logs (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    message_id TEXT NOT NULL,
    request_json TEXT NOT NULL,
    response_json TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    FOREIGN KEY (conversation_id)
        REFERENCES iai_conversations(id) ON DELETE CASCADE,
    FOREIGN KEY (message_id)
        REFERENCES iai_messages(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_iai_debug_logs_conversation
    ON iai_debug_logs(conversation_id, timestamp);
"#;

const CONVERSATION_COLUMNS: &str =
    "id, user_name, project_name, title, created_at, last_updated_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, \
     input_tokens, output_tokens, timestamp";
const DEBUG_LOG_COLUMNS: &str = "id, conversation_id, message_id, \
     request_json, response_json, timestamp";

/// A conversation store persisted in a SQLite database.
///
/// Statements run on the blocking thread pool while holding the connection
/// lock. Appends are serialized by that lock, which keeps the
/// per-conversation timestamps strictly increasing.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and applies the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(StoreError::backend)?;
        info!("opened conversation database at {}", path.display());
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::backend)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(StoreError::backend)?;
        conn.execute_batch(SCHEMA).map_err(StoreError::backend)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection without blocking the async runtime.
    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        spawn_blocking(move || f(&mut lock(&conn)))
            .await
            .map_err(StoreError::backend)?
    }

    async fn list_where(
        &self,
        column: &'static str,
        value: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError> {
        let value = value.to_owned();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .run(move |conn| {
                let sql = format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM iai_conversations \
                     WHERE {column} = ?1 ORDER BY last_updated_at DESC \
                     LIMIT ?2"
                );
                let mut stmt =
                    conn.prepare(&sql).map_err(StoreError::backend)?;
                let rows = stmt
                    .query_map(
                        params![value, limit],
                        ConversationRow::from_row,
                    )
                    .map_err(StoreError::backend)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(StoreError::backend)?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(Conversation::try_from).collect()
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    // A statement never leaves the connection half-updated, so a poisoned
    // lock is still usable.
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

fn conversation_exists(
    conn: &Connection,
    id: &ConversationId,
) -> Result<bool, StoreError> {
    conn.query_row(
        "SELECT 1 FROM iai_conversations WHERE id = ?1",
        params![id.as_str()],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(StoreError::backend)
}

fn ensure_exists(
    conn: &Connection,
    id: &ConversationId,
) -> Result<(), StoreError> {
    if conversation_exists(conn, id)? {
        Ok(())
    } else {
        Err(StoreError::ConversationNotFound(id.clone()))
    }
}

fn insert_message(
    conn: &mut Connection,
    id: &ConversationId,
    message: NewMessage,
    content: &str,
) -> Result<Message, StoreError> {
    let tx = conn.transaction().map_err(StoreError::backend)?;
    ensure_exists(&tx, id)?;
    let last: Option<i64> = tx
        .query_row(
            "SELECT MAX(timestamp) FROM iai_messages \
             WHERE conversation_id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .map_err(StoreError::backend)?;
    let timestamp = next_message_timestamp(
        last.and_then(DateTime::from_timestamp_millis),
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
    tx.execute(
        &format!(
            "INSERT INTO iai_messages ({MESSAGE_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ),
        params![
            message.id.as_str(),
            id.as_str(),
            message.role.as_str(),
            content,
            message.usage.map(|u| u.input_tokens as i64),
            message.usage.map(|u| u.output_tokens as i64),
            timestamp.timestamp_millis(),
        ],
    )
    .map_err(StoreError::backend)?;
    tx.commit().map_err(StoreError::backend)?;
    Ok(message)
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_conversation(
        &self,
        user_name: &str,
        project_name: &str,
        title: &str,
    ) -> Result<Conversation, StoreError> {
        let now = now_millis();
        let conversation = Conversation {
            id: ConversationId::random(),
            user_name: user_name.to_owned(),
            project_name: project_name.to_owned(),
            title: title.to_owned(),
            created_at: now,
            last_updated_at: now,
        };
        let row = conversation.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO iai_conversations \
                 (id, user_name, project_name, title, created_at, \
                 last_updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row.id.as_str(),
                    row.user_name,
                    row.project_name,
                    row.title,
                    now.timestamp_millis(),
                    now.timestamp_millis(),
                ],
            )
            .map_err(StoreError::backend)
        })
        .await?;
        debug!("created conversation {}", conversation.id);
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        let id = id.clone();
        let row = self
            .run(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {CONVERSATION_COLUMNS} \
                         FROM iai_conversations WHERE id = ?1"
                    ),
                    params![id.as_str()],
                    ConversationRow::from_row,
                )
                .optional()
                .map_err(StoreError::backend)
            })
            .await?;
        row.map(Conversation::try_from).transpose()
    }

    async fn update_conversation(
        &self,
        id: &ConversationId,
        title: &str,
        last_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let target = id.clone();
        let title = title.to_owned();
        let changed = self
            .run(move |conn| {
                conn.execute(
                    "UPDATE iai_conversations \
                     SET title = ?1, last_updated_at = ?2 WHERE id = ?3",
                    params![
                        title,
                        last_updated_at.timestamp_millis(),
                        target.as_str()
                    ],
                )
                .map_err(StoreError::backend)
            })
            .await?;
        if changed == 0 {
            return Err(StoreError::ConversationNotFound(id.clone()));
        }
        Ok(())
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        message: NewMessage,
    ) -> Result<Message, StoreError> {
        let content = serde_json::to_string(&message.content)
            .map_err(StoreError::backend)?;
        let id = id.clone();
        let message = self
            .run(move |conn| insert_message(conn, &id, message, &content))
            .await?;
        trace!(
            "appended a {} message to {}",
            message.role, message.conversation_id
        );
        Ok(message)
    }

    async fn load_history(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        let id = id.clone();
        let rows = self
            .run(move |conn| {
                ensure_exists(conn, &id)?;
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {MESSAGE_COLUMNS} FROM iai_messages \
                         WHERE conversation_id = ?1 ORDER BY timestamp, rowid"
                    ))
                    .map_err(StoreError::backend)?;
                let rows = stmt
                    .query_map(params![id.as_str()], MessageRow::from_row)
                    .map_err(StoreError::backend)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(StoreError::backend)?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(Message::try_from).collect()
    }

    async fn count_messages(
        &self,
        id: &ConversationId,
    ) -> Result<usize, StoreError> {
        let id = id.clone();
        let count: i64 = self
            .run(move |conn| {
                ensure_exists(conn, &id)?;
                conn.query_row(
                    "SELECT COUNT(*) FROM iai_messages \
                     WHERE conversation_id = ?1",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .map_err(StoreError::backend)
            })
            .await?;
        Ok(count.max(0) as usize)
    }

    async fn list_by_user(
        &self,
        user_name: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError> {
        self.list_where("user_name", user_name, limit).await
    }

    async fn list_by_project(
        &self,
        project_name: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError> {
        self.list_where("project_name", project_name, limit).await
    }

    async fn append_debug_log(&self, log: DebugLog) -> Result<(), StoreError> {
        let request =
            serde_json::to_string(&log.request).map_err(StoreError::backend)?;
        let response =
            serde_json::to_string(&log.response).map_err(StoreError::backend)?;
        self.run(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO iai_debug_logs ({DEBUG_LOG_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    log.id.as_str(),
                    log.conversation_id.as_str(),
                    log.message_id.as_str(),
                    request,
                    response,
                    log.timestamp.timestamp_millis(),
                ],
            )
            .map_err(StoreError::backend)
        })
        .await?;
        Ok(())
    }

    async fn list_debug_logs(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<DebugLog>, StoreError> {
        let id = id.clone();
        let rows = self
            .run(move |conn| {
                ensure_exists(conn, &id)?;
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {DEBUG_LOG_COLUMNS} FROM iai_debug_logs \
                         WHERE conversation_id = ?1 ORDER BY timestamp, rowid"
                    ))
                    .map_err(StoreError::backend)?;
                let rows = stmt
                    .query_map(params![id.as_str()], DebugLogRow::from_row)
                    .map_err(StoreError::backend)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(StoreError::backend)?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(DebugLog::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use iai_core::conversation::{DebugLogId, MessageContent, MessageRole};
    use iai_model::{ContentBlock, Usage};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn assistant_reply() -> NewMessage {
        NewMessage::assistant(
            vec![
                ContentBlock::Text {
                    text: "Let me check.".to_owned(),
                },
                ContentBlock::ToolUse {
                    id: "toolu_1".to_owned(),
                    name: "get_project_info".to_owned(),
                    input: json!({ "project_name": "aimee" }),
                },
            ],
            Usage::new(50, 30),
        )
    }

    #[tokio::test]
    async fn test_append_and_load() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conv = store
            .create_conversation("test_user", "aimee", "")
            .await
            .unwrap();

        store
            .append_message(&conv.id, NewMessage::user("What is aimee?"))
            .await
            .unwrap();
        let reply = store
            .append_message(&conv.id, assistant_reply())
            .await
            .unwrap();
        store
            .append_message(
                &conv.id,
                NewMessage::tool_result(
                    "toolu_1",
                    "get_project_info",
                    r#"{"title":"AIMEE"}"#,
                    false,
                ),
            )
            .await
            .unwrap();

        let history = store.load_history(&conv.id).await.unwrap();
        let roles: Vec<_> = history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [MessageRole::User, MessageRole::Assistant, MessageRole::Tool]
        );
        assert_eq!(history[1], reply);
        assert_eq!(history[1].usage, Some(Usage::new(50, 30)));
        assert_eq!(history[0].usage, None);
        assert!(history[0].timestamp < history[1].timestamp);
        assert!(history[1].timestamp < history[2].timestamp);
        assert!(matches!(
            &history[2].content,
            MessageContent::ToolResult { tool_use_id, .. }
                if tool_use_id == "toolu_1"
        ));
        assert_eq!(store.count_messages(&conv.id).await.unwrap(), 3);

        assert_eq!(store.load_history(&conv.id).await.unwrap(), history);
    }

    #[tokio::test]
    async fn test_conversation_metadata() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conv = store
            .create_conversation("test_user", "aimee", "")
            .await
            .unwrap();
        assert_eq!(
            store.get_conversation(&conv.id).await.unwrap(),
            Some(conv.clone())
        );

        let later = now_millis() + Duration::seconds(5);
        store
            .update_conversation(&conv.id, "What is aimee?", later)
            .await
            .unwrap();
        let updated = store.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(updated.title, "What is aimee?");
        assert_eq!(updated.last_updated_at, later);
        assert_eq!(updated.created_at, conv.created_at);
    }

    #[tokio::test]
    async fn test_unknown_conversation() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = ConversationId::from("missing");
        assert!(store.get_conversation(&id).await.unwrap().is_none());
        assert!(matches!(
            store.append_message(&id, NewMessage::user("Hi")).await,
            Err(StoreError::ConversationNotFound(_))
        ));
        assert!(matches!(
            store.update_conversation(&id, "t", Utc::now()).await,
            Err(StoreError::ConversationNotFound(_))
        ));
        assert!(matches!(
            store.count_messages(&id).await,
            Err(StoreError::ConversationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_listing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store
            .create_conversation("alice", "aimee", "first")
            .await
            .unwrap();
        let second = store
            .create_conversation("alice", "other", "second")
            .await
            .unwrap();
        store
            .create_conversation("bob", "aimee", "third")
            .await
            .unwrap();
        store
            .update_conversation(
                &second.id,
                "second",
                now_millis() + Duration::seconds(10),
            )
            .await
            .unwrap();

        let alice = store.list_by_user("alice", 10).await.unwrap();
        let ids: Vec<_> = alice.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, [second.id, first.id]);

        assert_eq!(store.list_by_user("alice", 1).await.unwrap().len(), 1);
        let aimee = store.list_by_project("aimee", 10).await.unwrap();
        assert_eq!(aimee.len(), 2);
        assert!(aimee.iter().all(|c| c.project_name == "aimee"));
    }

    #[tokio::test]
    async fn test_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("iai.db");

        let conv_id = {
            let store = SqliteStore::open(&path).unwrap();
            let conv = store
                .create_conversation("test_user", "aimee", "Reopen")
                .await
                .unwrap();
            store
                .append_message(&conv.id, NewMessage::user("Hi"))
                .await
                .unwrap();
            store
                .append_message(&conv.id, assistant_reply())
                .await
                .unwrap();
            conv.id
        };

        let store = SqliteStore::open(&path).unwrap();
        let history = store.load_history(&conv_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, assistant_reply().content);
        let conv = store.get_conversation(&conv_id).await.unwrap().unwrap();
        assert_eq!(conv.title, "Reopen");
    }

    #[tokio::test]
    async fn test_corrupted_content() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conv = store
            .create_conversation("test_user", "aimee", "")
            .await
            .unwrap();
        lock(&store.conn)
            .execute(
                "INSERT INTO iai_messages \
                 (id, conversation_id, role, content, timestamp) \
                 VALUES ('m1', ?1, 'user', 'not json', 1)",
                params![conv.id.as_str()],
            )
            .unwrap();

        assert!(matches!(
            store.load_history(&conv.id).await,
            Err(StoreError::Corrupted(_))
        ));
    }

    #[tokio::test]
    async fn test_summary_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("iai.db");

        let store = SqliteStore::open(&path).unwrap();
        let conv = store
            .create_conversation("test_user", "aimee", "")
            .await
            .unwrap();
        let kept = store
            .append_message(&conv.id, NewMessage::user("Hi"))
            .await
            .unwrap();
        let summary = NewMessage::summary("- greeted", 4, Some(kept.id));
        store.append_message(&conv.id, summary.clone()).await.unwrap();
        drop(store);

        let store = SqliteStore::open(&path).unwrap();
        let history = store.load_history(&conv.id).await.unwrap();
        assert_eq!(history[1].role, MessageRole::User);
        assert_eq!(history[1].content, summary.content);
    }

    #[tokio::test]
    async fn test_debug_logs() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conv = store
            .create_conversation("test_user", "aimee", "")
            .await
            .unwrap();
        let reply = store
            .append_message(&conv.id, assistant_reply())
            .await
            .unwrap();

        let log = DebugLog {
            id: DebugLogId::random(),
            conversation_id: conv.id.clone(),
            message_id: reply.id.clone(),
            request: json!({ "messages": [{ "role": "user" }] }),
            response: json!({ "stop_reason": "tool_use" }),
            timestamp: now_millis(),
        };
        store.append_debug_log(log.clone()).await.unwrap();
        let logs = store.list_debug_logs(&conv.id).await.unwrap();
        assert_eq!(logs, [log.clone()]);

        // The referenced message has to exist.
        let dangling = DebugLog {
            id: DebugLogId::random(),
            message_id: MessageId::from("missing"),
            ..log
        };
        assert!(store.append_debug_log(dangling).await.is_err());
        assert_eq!(store.list_debug_logs(&conv.id).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let conv = store
            .create_conversation("test_user", "aimee", "")
            .await
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|idx| {
                let store = store.clone();
                let id = conv.id.clone();
                tokio::spawn(async move {
                    let text = format!("message {idx}");
                    store.append_message(&id, NewMessage::user(text)).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let history = store.load_history(&conv.id).await.unwrap();
        assert_eq!(history.len(), 16);
        assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }
}
