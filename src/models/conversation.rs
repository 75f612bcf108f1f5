use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::MessageRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub user_id: i64,
    pub conversation_type: String,
    pub started_at: NaiveDateTime,
}

/// A single persisted turn. Messages are append-only; `id` is the creation
/// sequence and defines ordering within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: MessageRole,
    pub agent_type: Option<String>,
    pub content: String,
    pub created_at: NaiveDateTime,
}
