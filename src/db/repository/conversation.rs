use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::sqlite::TIMESTAMP_FORMAT;
use crate::db::DatabaseError;
use crate::models::enums::MessageRole;
use crate::models::{Conversation, Message};

pub fn insert_conversation(
    conn: &Connection,
    user_id: i64,
    conversation_type: &str,
    started_at: NaiveDateTime,
) -> Result<Conversation, DatabaseError> {
    conn.execute(
        "INSERT INTO conversations (user_id, conversation_type, started_at) VALUES (?1, ?2, ?3)",
        params![
            user_id,
            conversation_type,
            started_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )?;
    Ok(Conversation {
        id: conn.last_insert_rowid(),
        user_id,
        conversation_type: conversation_type.to_string(),
        started_at,
    })
}

pub fn get_conversation(conn: &Connection, id: i64) -> Result<Option<Conversation>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, user_id, conversation_type, started_at FROM conversations WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    Ok(row.map(|(id, user_id, conversation_type, started_at)| Conversation {
        id,
        user_id,
        conversation_type,
        started_at: parse_timestamp(&started_at),
    }))
}

pub fn insert_message(
    conn: &Connection,
    conversation_id: i64,
    role: MessageRole,
    agent_type: Option<&str>,
    content: &str,
    created_at: NaiveDateTime,
) -> Result<Message, DatabaseError> {
    conn.execute(
        "INSERT INTO messages (conversation_id, role, agent_type, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            conversation_id,
            role.as_str(),
            agent_type,
            content,
            created_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )?;
    Ok(Message {
        id: conn.last_insert_rowid(),
        conversation_id,
        role,
        agent_type: agent_type.map(str::to_string),
        content: content.to_string(),
        created_at,
    })
}

/// All messages of a conversation, oldest first (creation sequence).
pub fn get_messages_by_conversation(
    conn: &Connection,
    conversation_id: i64,
) -> Result<Vec<Message>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, role, agent_type, content, created_at
         FROM messages WHERE conversation_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![conversation_id], |row| {
        Ok(MessageRow {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            role: row.get(2)?,
            agent_type: row.get(3)?,
            content: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(message_from_row(row?)?);
    }
    Ok(messages)
}

pub fn count_messages(conn: &Connection, conversation_id: i64) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
        params![conversation_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

struct MessageRow {
    id: i64,
    conversation_id: i64,
    role: String,
    agent_type: Option<String>,
    content: String,
    created_at: String,
}

fn message_from_row(row: MessageRow) -> Result<Message, DatabaseError> {
    Ok(Message {
        id: row.id,
        conversation_id: row.conversation_id,
        role: MessageRole::from_str(&row.role)?,
        agent_type: row.agent_type,
        content: row.content,
        created_at: parse_timestamp(&row.created_at),
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).unwrap_or_default()
}
