// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation history persistence.

use async_trait::async_trait;

use crate::error::TallyError;
use crate::types::{ConversationId, ConversationSummary, Message};

/// Append-only store of conversation messages.
///
/// Messages are returned in the order they were appended. A single
/// `append_messages` call is atomic: either every message lands, contiguous
/// and in order, or none does.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Creates an empty conversation and returns its id.
    async fn create_conversation(&self, title: Option<&str>) -> Result<ConversationId, TallyError>;

    /// Whether a conversation with this id exists.
    async fn conversation_exists(&self, id: &ConversationId) -> Result<bool, TallyError>;

    /// Appends messages to the end of a conversation.
    async fn append_messages(
        &self,
        id: &ConversationId,
        messages: &[Message],
    ) -> Result<(), TallyError>;

    /// Loads the full ordered history of a conversation.
    async fn load_messages(&self, id: &ConversationId) -> Result<Vec<Message>, TallyError>;

    /// Loads the last `limit` messages, oldest first.
    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, TallyError>;

    /// Summary of a single conversation.
    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationSummary>, TallyError>;

    /// Most recently updated conversations first.
    async fn list_conversations(&self, limit: usize)
    -> Result<Vec<ConversationSummary>, TallyError>;
}
