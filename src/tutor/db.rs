use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};

use super::models::{Conversation, Message, Page, Role};

/// Append-only view of a conversation's message log.
///
/// This is the only storage surface the dialogue core depends on.
/// Real implementation: `DbHandle`. Test double: `testing::FailingLog`.
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn append_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<Message>;

    async fn list_messages(&self, conversation_id: i64, page: Page) -> Result<Vec<Message>>;
}

/// Async-safe handle to the tutor database.
///
/// Wraps `TutorDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<TutorDb>>,
}

impl DbHandle {
    pub fn new(db: TutorDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&TutorDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

#[async_trait]
impl MessageLog for DbHandle {
    async fn append_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<Message> {
        let content = content.to_string();
        self.call(move |db| db.append_message(conversation_id, role, &content))
            .await
    }

    async fn list_messages(&self, conversation_id: i64, page: Page) -> Result<Vec<Message>> {
        self.call(move |db| db.list_messages(conversation_id, page)).await
    }
}

pub struct TutorDb {
    conn: Connection,
}

impl TutorDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS conversations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    title TEXT NOT NULL DEFAULT 'Untitled Conversation',
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                    role TEXT NOT NULL CHECK (role IN ('user', 'chatbot', 'system')),
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id);
                CREATE INDEX IF NOT EXISTS idx_messages_conversation
                    ON messages(conversation_id, created_at, id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Conversation CRUD ─────────────────────────────────────────────

    pub fn create_conversation(&self, user_id: &str, title: &str) -> Result<Conversation> {
        self.conn
            .execute(
                "INSERT INTO conversations (user_id, title, created_at) VALUES (?1, ?2, ?3)",
                params![user_id, title, now()],
            )
            .context("Failed to insert conversation")?;
        let id = self.conn.last_insert_rowid();
        self.get_conversation(id)?
            .context("Conversation not found after insert")
    }

    pub fn get_conversation(&self, id: i64) -> Result<Option<Conversation>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, user_id, title, created_at FROM conversations WHERE id = ?1")
            .context("Failed to prepare get_conversation")?;
        let mut rows = stmt
            .query_map(params![id], conversation_from_row)
            .context("Failed to query conversation")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read conversation row")?)),
            None => Ok(None),
        }
    }

    /// A user's conversations, newest first.
    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, title, created_at FROM conversations
                 WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            )
            .context("Failed to prepare list_conversations")?;
        let rows = stmt
            .query_map(params![user_id], conversation_from_row)
            .context("Failed to query conversations")?;
        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row.context("Failed to read conversation row")?);
        }
        Ok(conversations)
    }

    /// Delete a conversation and, through the foreign key, all of its messages.
    pub fn delete_conversation(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM conversations WHERE id = ?1", params![id])
            .context("Failed to delete conversation")?;
        Ok(affected > 0)
    }

    // ── Message log ───────────────────────────────────────────────────

    pub fn append_message(&self, conversation_id: i64, role: Role, content: &str) -> Result<Message> {
        self.conn
            .execute(
                "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![conversation_id, role.as_str(), content, now()],
            )
            .with_context(|| format!("Failed to append message to conversation {}", conversation_id))?;
        let id = self.conn.last_insert_rowid();
        self.get_message(id)?.context("Message not found after insert")
    }

    fn get_message(&self, id: i64) -> Result<Option<Message>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, conversation_id, role, content, created_at FROM messages WHERE id = ?1",
            )
            .context("Failed to prepare get_message")?;
        let mut rows = stmt
            .query_map(params![id], message_row)
            .context("Failed to query message")?;
        match rows.next() {
            Some(row) => {
                let r = row.context("Failed to read message row")?;
                Ok(Some(r.into_message()?))
            }
            None => Ok(None),
        }
    }

    /// Messages in `(created_at, id)` order, windowed by `page`.
    pub fn list_messages(&self, conversation_id: i64, page: Page) -> Result<Vec<Message>> {
        let order = page.order.as_sql();
        let sql = format!(
            "SELECT id, conversation_id, role, content, created_at FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at {order}, id {order}
             LIMIT ?2 OFFSET ?3"
        );
        // SQLite treats a negative LIMIT as "no limit".
        let limit = page.limit.map(|l| l as i64).unwrap_or(-1);
        let offset = page.offset as i64;

        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_messages")?;
        let rows = stmt
            .query_map(params![conversation_id, limit, offset], message_row)
            .context("Failed to query messages")?;
        let mut messages = Vec::new();
        for row in rows {
            let r = row.context("Failed to read message row")?;
            messages.push(r.into_message()?);
        }
        Ok(messages)
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Raw message row; `role` is validated when converted.
struct MessageRow {
    id: i64,
    conversation_id: i64,
    role: String,
    content: String,
    created_at: String,
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        let role = Role::from_str(&self.role).map_err(|e| anyhow::anyhow!(e))?;
        Ok(Message {
            id: self.id,
            conversation_id: self.conversation_id,
            role,
            content: self.content,
            created_at: self.created_at,
        })
    }
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tutor::models::SortOrder;

    fn db_with_conversation() -> (TutorDb, Conversation) {
        let db = TutorDb::new_in_memory().unwrap();
        let convo = db.create_conversation("user-1", "Physics").unwrap();
        (db, convo)
    }

    #[test]
    fn test_create_and_get_conversation() {
        let (db, convo) = db_with_conversation();
        assert!(convo.id > 0);
        assert_eq!(convo.user_id, "user-1");
        assert_eq!(convo.title, "Physics");

        let fetched = db.get_conversation(convo.id).unwrap().unwrap();
        assert_eq!(fetched, convo);
        assert!(db.get_conversation(9999).unwrap().is_none());
    }

    #[test]
    fn test_list_conversations_scoped_to_user_newest_first() {
        let db = TutorDb::new_in_memory().unwrap();
        let first = db.create_conversation("alice", "one").unwrap();
        let second = db.create_conversation("alice", "two").unwrap();
        db.create_conversation("bob", "other").unwrap();

        let convos = db.list_conversations("alice").unwrap();
        assert_eq!(convos.len(), 2);
        assert_eq!(convos[0].id, second.id);
        assert_eq!(convos[1].id, first.id);
        assert!(db.list_conversations("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_append_and_list_messages_in_order() {
        let (db, convo) = db_with_conversation();
        db.append_message(convo.id, Role::Chatbot, "hello").unwrap();
        db.append_message(convo.id, Role::User, "teach me vectors").unwrap();
        db.append_message(convo.id, Role::System, "-ASSESSMENT_STARTED-").unwrap();

        let asc = db.list_messages(convo.id, Page::all()).unwrap();
        let contents: Vec<&str> = asc.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "teach me vectors", "-ASSESSMENT_STARTED-"]);
        assert_eq!(asc[1].role, Role::User);

        let desc = db.list_messages(convo.id, Page::latest(2)).unwrap();
        let contents: Vec<&str> = desc.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["-ASSESSMENT_STARTED-", "teach me vectors"]);
    }

    #[test]
    fn test_list_messages_offset() {
        let (db, convo) = db_with_conversation();
        for i in 0..5 {
            db.append_message(convo.id, Role::User, &format!("m{}", i)).unwrap();
        }
        let page = Page {
            limit: Some(2),
            offset: 1,
            order: SortOrder::Asc,
        };
        let msgs = db.list_messages(convo.id, page).unwrap();
        let contents: Vec<&str> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m1", "m2"]);
    }

    #[test]
    fn test_append_to_missing_conversation_fails() {
        let db = TutorDb::new_in_memory().unwrap();
        assert!(db.append_message(404, Role::User, "orphan").is_err());
    }

    #[test]
    fn test_delete_conversation_cascades_messages() {
        let (db, convo) = db_with_conversation();
        db.append_message(convo.id, Role::User, "a").unwrap();
        db.append_message(convo.id, Role::Chatbot, "b").unwrap();

        assert!(db.delete_conversation(convo.id).unwrap());
        assert!(db.get_conversation(convo.id).unwrap().is_none());
        assert!(db.list_messages(convo.id, Page::all()).unwrap().is_empty());
        assert!(!db.delete_conversation(convo.id).unwrap());
    }

    #[test]
    fn test_file_backed_db_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tutor.db");
        let id = {
            let db = TutorDb::new(&path).unwrap();
            let convo = db.create_conversation("u", "t").unwrap();
            db.append_message(convo.id, Role::User, "kept").unwrap();
            convo.id
        };
        let db = TutorDb::new(&path).unwrap();
        let msgs = db.list_messages(id, Page::all()).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "kept");
    }

    #[tokio::test]
    async fn test_db_handle_implements_message_log() {
        let db = TutorDb::new_in_memory().unwrap();
        let convo = db.create_conversation("u", "t").unwrap();
        let handle = DbHandle::new(db);
        let log: &dyn MessageLog = &handle;

        let appended = log.append_message(convo.id, Role::User, "hi").await.unwrap();
        assert_eq!(appended.content, "hi");
        assert_eq!(appended.conversation_id, convo.id);

        let msgs = log.list_messages(convo.id, Page::all()).await.unwrap();
        assert_eq!(msgs, vec![appended]);
    }
}
