//! PostgreSQL implementation of [`ConversationStore`].
//!
//! Uses runtime-verified `sqlx::query` so no DATABASE_URL is needed at
//! compile time. Migrations under `./migrations` are embedded at compile
//! time and applied on connect.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::postgres::PgPool;

use crate::errors::PersistenceError;
use crate::history::ConversationStore;
use crate::models::chat::{ChatMessage, Conversation};

pub struct PostgresConversationStore {
    pool: PgPool,
}

impl PostgresConversationStore {
    pub async fn connect(url: &str) -> Result<Self, PersistenceError> {
        let pool = PgPool::connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Conversation store connected");
        Ok(Self { pool })
    }
}

#[async_trait]
impl ConversationStore for PostgresConversationStore {
    async fn ensure_session(&self, chat_id: &str) -> Result<(), PersistenceError> {
        sqlx::query("INSERT INTO chat_sessions (chat_id) VALUES ($1) ON CONFLICT (chat_id) DO NOTHING")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_message(
        &self,
        chat_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), PersistenceError> {
        sqlx::query("INSERT INTO chat_messages (chat_id, message, role) VALUES ($1, $2, $3)")
            .bind(chat_id)
            .bind(content)
            .bind(role)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recent_history(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Conversation, PersistenceError> {
        // Newest-first fetch bounded by LIMIT; reversed to chronological
        // order before returning.
        let rows: Vec<(i64, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, role, message, created_at FROM chat_messages \
             WHERE chat_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(chat_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let messages = rows
            .into_iter()
            .map(|(id, role, content, created_at)| ChatMessage {
                id,
                role,
                content,
                created_at,
            })
            .collect();

        Ok(Conversation::from_newest_first(chat_id, messages))
    }
}
