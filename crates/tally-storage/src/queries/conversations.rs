// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation and message log operations.
//!
//! Messages carry a per-conversation `seq` so history order never depends on
//! timestamps. An append runs in one transaction: all messages land
//! contiguously or none do.

use std::str::FromStr;

use rusqlite::{OptionalExtension, params};
use tally_core::{ConversationId, ConversationSummary, Message, Role, TallyError, TokenUsage};

use crate::database::{Database, from_sql_err, map_tr_err, now_timestamp, to_sql_err};

/// Longest title derived from a first user message, in characters.
pub const TITLE_MAX_CHARS: usize = 60;

/// Derive a conversation title from the first user message.
pub fn derive_title(content: &str) -> Option<String> {
    let line = content.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(line.chars().take(TITLE_MAX_CHARS).collect())
}

/// Create an empty conversation with a fresh UUID.
pub async fn create_conversation(
    db: &Database,
    title: Option<&str>,
) -> Result<ConversationId, TallyError> {
    let id = uuid::Uuid::new_v4().to_string();
    let title = title.and_then(derive_title);
    let now = now_timestamp();
    let row_id = id.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![row_id, title, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(ConversationId(id))
}

pub async fn conversation_exists(db: &Database, id: &ConversationId) -> Result<bool, TallyError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let found = conn
                .query_row("SELECT 1 FROM conversations WHERE id = ?1", params![id], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
        .await
        .map_err(map_tr_err)
}

/// Append `messages` after the current tail of the conversation.
///
/// Fails with a storage error when the conversation does not exist. The first
/// user message of an untitled conversation becomes its title.
pub async fn append_messages(
    db: &Database,
    id: &ConversationId,
    messages: &[Message],
) -> Result<(), TallyError> {
    if messages.is_empty() {
        return Ok(());
    }
    let id = id.0.clone();
    let messages = messages.to_vec();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            // Errors with QueryReturnedNoRows for unknown conversations.
            tx.query_row("SELECT 1 FROM conversations WHERE id = ?1", params![id], |_| Ok(()))?;

            let mut seq: i64 = tx.query_row(
                "SELECT COALESCE(MAX(seq), -1) + 1 FROM conversation_messages WHERE conversation_id = ?1",
                params![id],
                |row| row.get(0),
            )?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO conversation_messages
                        (conversation_id, seq, role, content, tool_calls, tool_result, model,
                         input_tokens, output_tokens, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )?;
                for msg in &messages {
                    let tool_calls = if msg.tool_calls.is_empty() {
                        None
                    } else {
                        Some(serde_json::to_string(&msg.tool_calls).map_err(to_sql_err)?)
                    };
                    let tool_result = msg
                        .tool_result
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()
                        .map_err(to_sql_err)?;
                    stmt.execute(params![
                        id,
                        seq,
                        msg.role.to_string(),
                        msg.content,
                        tool_calls,
                        tool_result,
                        msg.model,
                        msg.usage.map(|u| u.input_tokens),
                        msg.usage.map(|u| u.output_tokens),
                        now,
                    ])?;
                    seq += 1;
                }
            }

            if let Some(title) = messages
                .iter()
                .find(|m| m.role == Role::User)
                .and_then(|m| derive_title(&m.content))
            {
                tx.execute(
                    "UPDATE conversations SET title = ?2 WHERE id = ?1 AND title IS NULL",
                    params![id, title],
                )?;
            }
            tx.execute(
                "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
                params![id, now],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(0)?;
    let role = Role::from_str(&role).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let tool_calls: Option<String> = row.get(2)?;
    let tool_calls = match tool_calls {
        Some(json) => serde_json::from_str(&json).map_err(|e| from_sql_err(2, e))?,
        None => Vec::new(),
    };
    let tool_result: Option<String> = row.get(3)?;
    let tool_result = tool_result
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(|e| from_sql_err(3, e))?;
    let input: Option<u32> = row.get(5)?;
    let output: Option<u32> = row.get(6)?;
    Ok(Message {
        role,
        content: row.get(1)?,
        tool_calls,
        tool_result,
        model: row.get(4)?,
        usage: match (input, output) {
            (Some(input_tokens), Some(output_tokens)) => Some(TokenUsage {
                input_tokens,
                output_tokens,
            }),
            _ => None,
        },
    })
}

/// Full history of a conversation in append order.
pub async fn load_messages(db: &Database, id: &ConversationId) -> Result<Vec<Message>, TallyError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content, tool_calls, tool_result, model, input_tokens, output_tokens
                 FROM conversation_messages
                 WHERE conversation_id = ?1
                 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![id], message_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// The last `limit` messages of a conversation, still in append order.
pub async fn recent_messages(
    db: &Database,
    id: &ConversationId,
    limit: usize,
) -> Result<Vec<Message>, TallyError> {
    let id = id.0.clone();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content, tool_calls, tool_result, model, input_tokens, output_tokens
                 FROM (
                     SELECT * FROM conversation_messages
                     WHERE conversation_id = ?1
                     ORDER BY seq DESC
                     LIMIT ?2
                 )
                 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![id, limit], message_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationSummary> {
    Ok(ConversationSummary {
        id: ConversationId(row.get(0)?),
        title: row.get(1)?,
        message_count: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Summary of one conversation, if it exists.
pub async fn get_conversation(
    db: &Database,
    id: &ConversationId,
) -> Result<Option<ConversationSummary>, TallyError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT c.id, c.title, COUNT(m.id), c.created_at, c.updated_at
                 FROM conversations c
                 LEFT JOIN conversation_messages m ON m.conversation_id = c.id
                 WHERE c.id = ?1
                 GROUP BY c.id",
                params![id],
                summary_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Most recently updated conversations first.
pub async fn list_conversations(
    db: &Database,
    limit: usize,
) -> Result<Vec<ConversationSummary>, TallyError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.title, COUNT(m.id), c.created_at, c.updated_at
                 FROM conversations c
                 LEFT JOIN conversation_messages m ON m.conversation_id = c.id
                 GROUP BY c.id
                 ORDER BY c.updated_at DESC, c.rowid DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], summary_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
