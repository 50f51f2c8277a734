use std::sync::Arc;

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};

use super::model::{
    auto_title, AppendedMessage, Conversation, ConversationWithMessages, Message, MessageRole,
};

/// Conversations and their messages. Every query is scoped by `user_id`, so a
/// conversation owned by someone else looks exactly like a missing one.
#[derive(Clone)]
pub struct ConversationRepository {
    pub pool: Arc<SqlitePool>,
}

impl ConversationRepository {
    pub async fn list(&self, user_id: i64) -> sqlx::Result<Vec<Conversation>> {
        sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, title, auto_renamed, created_at, updated_at
            FROM conversations
            WHERE user_id = ?
            ORDER BY updated_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&*self.pool)
        .await
    }

    /// Case-insensitive substring match on titles. SQLite `LIKE` only folds
    /// ASCII, so the comparison happens on lowercased strings here instead.
    pub async fn search(&self, user_id: i64, query: &str) -> sqlx::Result<Vec<Conversation>> {
        let needle = query.to_lowercase();
        let conversations = self.list(user_id).await?;
        Ok(conversations
            .into_iter()
            .filter(|conversation| conversation.title.to_lowercase().contains(&needle))
            .collect())
    }

    pub async fn create(&self, user_id: i64, title: &str) -> sqlx::Result<Conversation> {
        let now = Utc::now();
        sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (user_id, title, auto_renamed, created_at, updated_at)
            VALUES (?, ?, 0, ?, ?)
            RETURNING id, title, auto_renamed, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.pool)
        .await
    }

    pub async fn find(&self, user_id: i64, conversation_id: i64) -> sqlx::Result<Option<Conversation>> {
        sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, title, auto_renamed, created_at, updated_at
            FROM conversations
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&*self.pool)
        .await
    }

    pub async fn retrieve(
        &self,
        user_id: i64,
        conversation_id: i64,
    ) -> sqlx::Result<Option<ConversationWithMessages>> {
        let Some(conversation) = self.find(user_id, conversation_id).await? else {
            return Ok(None);
        };

        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, role, content, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(Some(ConversationWithMessages {
            conversation,
            messages,
        }))
    }

    /// Applies whichever of `title` / `auto_renamed` is given. Returns false
    /// when the conversation is not the caller's.
    pub async fn update(
        &self,
        user_id: i64,
        conversation_id: i64,
        title: Option<&str>,
        auto_renamed: Option<bool>,
    ) -> sqlx::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET title = COALESCE(?, title),
                auto_renamed = COALESCE(?, auto_renamed)
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(title)
        .bind(auto_renamed)
        .bind(conversation_id)
        .bind(user_id)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, user_id: i64, conversation_id: i64) -> sqlx::Result<u64> {
        let rows_affected = sqlx::query("DELETE FROM conversations WHERE id = ? AND user_id = ?")
            .bind(conversation_id)
            .bind(user_id)
            .execute(&*self.pool)
            .await?
            .rows_affected();
        Ok(rows_affected)
    }

    /// Inserts the message, bumps the conversation's `updated_at` and, for the
    /// first user message of a conversation that was never renamed, titles it
    /// from the message. `None` when the conversation is not the caller's.
    pub async fn add_message(
        &self,
        user_id: i64,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> sqlx::Result<Option<AppendedMessage>> {
        let mut tx: Transaction<Sqlite> = self.pool.begin().await?;

        let auto_renamed = sqlx::query_scalar::<_, bool>(
            "SELECT auto_renamed FROM conversations WHERE id = ? AND user_id = ?",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(auto_renamed) = auto_renamed else {
            return Ok(None);
        };

        let title = if role == MessageRole::User && !auto_renamed {
            let earlier_user_messages = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ? AND role = 'user'",
            )
            .bind(conversation_id)
            .fetch_one(&mut *tx)
            .await?;

            (earlier_user_messages == 0).then(|| auto_title(content))
        } else {
            None
        };

        let now = Utc::now();
        let message_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO messages (conversation_id, role, content, created_at)
            VALUES (?, ?, ?, ?) RETURNING id
            "#,
        )
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        match &title {
            Some(title) => {
                sqlx::query(
                    "UPDATE conversations SET updated_at = ?, title = ?, auto_renamed = 1 WHERE id = ?",
                )
                .bind(now)
                .bind(title)
                .bind(conversation_id)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
                    .bind(now)
                    .bind(conversation_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        Ok(Some(AppendedMessage {
            id: message_id,
            title,
        }))
    }
}
