//! Conversation Store: append-only message log and latest-assessment store.
//!
//! The pipeline only sees the `ConversationStore` trait. `SqliteConversationStore`
//! is the production implementation: one `rusqlite::Connection` behind a mutex,
//! shared by every concurrent pipeline run.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Local;
use rusqlite::Connection;

use crate::db::{self, repository, DatabaseError};
use crate::models::enums::{MessageRole, SeverityBand};
use crate::models::{AssessmentResult, Conversation, Message};

/// Agent label stored on pipeline replies.
pub const MENTAL_AGENT: &str = "mental_agent";

/// Storage contract consumed by the counseling pipeline.
pub trait ConversationStore: Send + Sync {
    fn append_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        agent_type: Option<&str>,
        text: &str,
    ) -> Result<Message, DatabaseError>;

    /// Full ordered log, oldest first.
    fn get_messages(&self, conversation_id: i64) -> Result<Vec<Message>, DatabaseError>;

    fn get_assessment(&self, user_id: i64) -> Result<Option<AssessmentResult>, DatabaseError>;

    fn upsert_assessment(
        &self,
        user_id: i64,
        score: u8,
        band: SeverityBand,
    ) -> Result<AssessmentResult, DatabaseError>;

    fn get_conversation(&self, conversation_id: i64) -> Result<Option<Conversation>, DatabaseError>;

    /// Create a conversation for a user. A `None` type stores "default".
    fn start_conversation(
        &self,
        user_id: i64,
        conversation_type: Option<&str>,
    ) -> Result<Conversation, DatabaseError>;
}

/// SQLite-backed conversation store.
pub struct SqliteConversationStore {
    conn: Mutex<Connection>,
}

impl SqliteConversationStore {
    /// Wrap an already-migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open (and migrate) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(db::open_database(path)?))
    }

    /// Fresh in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(db::open_memory_database()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

impl ConversationStore for SqliteConversationStore {
    fn start_conversation(
        &self,
        user_id: i64,
        conversation_type: Option<&str>,
    ) -> Result<Conversation, DatabaseError> {
        let conn = self.lock()?;
        let conversation = repository::insert_conversation(
            &conn,
            user_id,
            conversation_type.unwrap_or("default"),
            Local::now().naive_local(),
        )?;
        tracing::debug!(conversation_id = conversation.id, user_id, "Conversation started");
        Ok(conversation)
    }

    fn append_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        agent_type: Option<&str>,
        text: &str,
    ) -> Result<Message, DatabaseError> {
        let conn = self.lock()?;
        repository::insert_message(
            &conn,
            conversation_id,
            role,
            agent_type,
            text,
            Local::now().naive_local(),
        )
    }

    fn get_messages(&self, conversation_id: i64) -> Result<Vec<Message>, DatabaseError> {
        let conn = self.lock()?;
        repository::get_messages_by_conversation(&conn, conversation_id)
    }

    fn get_assessment(&self, user_id: i64) -> Result<Option<AssessmentResult>, DatabaseError> {
        let conn = self.lock()?;
        repository::get_assessment(&conn, user_id)
    }

    fn upsert_assessment(
        &self,
        user_id: i64,
        score: u8,
        band: SeverityBand,
    ) -> Result<AssessmentResult, DatabaseError> {
        let conn = self.lock()?;
        repository::upsert_assessment(&conn, user_id, score, band, Local::now().naive_local())
    }

    fn get_conversation(&self, conversation_id: i64) -> Result<Option<Conversation>, DatabaseError> {
        let conn = self.lock()?;
        repository::get_conversation(&conn, conversation_id)
    }
}
