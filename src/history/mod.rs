mod postgres;

pub use postgres::PostgresConversationStore;

use crate::errors::PersistenceError;
use crate::models::chat::Conversation;
use async_trait::async_trait;

/// Durable per-session message log. Every call reflects current persisted
/// state; there is no in-memory cache in front of the store.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Creates the session row if absent. Idempotent, safe to call on every
    /// request.
    async fn ensure_session(&self, chat_id: &str) -> Result<(), PersistenceError>;

    /// Appends one message to the session log. Append-only: messages are
    /// never updated or deleted.
    async fn append_message(
        &self,
        chat_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), PersistenceError>;

    /// Returns up to `limit` most recent messages in chronological order
    /// (oldest first). An unknown session yields an empty conversation, not
    /// an error.
    async fn recent_history(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Conversation, PersistenceError>;
}

pub fn format_history_for_prompt(conversation: &Conversation) -> String {
    if conversation.messages.is_empty() {
        return String::new();
    }
    let mut result = String::from("Previous conversation:\n");
    for msg in &conversation.messages {
        let role_display = match msg.role.as_str() {
            "user" => "User",
            "assistant" => "Assistant",
            other => other,
        };

        result.push_str(&format!("{}: {}\n", role_display, msg.content));
    }

    result
}
