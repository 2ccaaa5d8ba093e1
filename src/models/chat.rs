use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn empty(id: &str) -> Self {
        Self {
            id: id.to_string(),
            messages: Vec::new(),
        }
    }

    /// Builds a conversation from rows fetched newest-first, restoring
    /// chronological (oldest-first) order.
    pub fn from_newest_first(id: &str, mut messages: Vec<ChatMessage>) -> Self {
        messages.reverse();
        Self {
            id: id.to_string(),
            messages,
        }
    }
}
