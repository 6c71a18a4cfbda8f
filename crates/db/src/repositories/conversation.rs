use chrono::Utc;
use sqlx::Row;

use souschef_core::domain::session::{NewMessage, StoredMessage};

use super::{format_timestamp, parse_timestamp, ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn recent_messages(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT role, content, created_at
             FROM (
                SELECT id, role, content, created_at
                FROM conversation_messages
                WHERE session_id = ? AND role IN ('user', 'assistant')
                ORDER BY created_at DESC, id DESC
                LIMIT ?
             )
             ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<StoredMessage, RepositoryError> {
                let created_at: String = row.try_get("created_at")?;
                Ok(StoredMessage {
                    role: row.try_get("role")?,
                    content: row.try_get("content")?,
                    created_at: parse_timestamp(&created_at, "created_at")?,
                })
            })
            .collect()
    }

    async fn insert_message(&self, message: NewMessage) -> Result<(), RepositoryError> {
        let tool_calls = message.tool_calls.as_ref().map(|value| value.to_string());
        sqlx::query(
            "INSERT INTO conversation_messages (session_id, role, content, tool_calls, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.session_id)
        .bind(&message.role)
        .bind(&message.content)
        .bind(tool_calls)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use souschef_core::domain::session::{ConversationSession, NewMessage};

    use super::SqlConversationRepository;
    use crate::repositories::{ConversationRepository, SessionRepository, SqlSessionRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlSessionRepository::new(pool.clone())
            .insert_session(ConversationSession {
                id: "s-1".to_string(),
                user_id: "user-1".to_string(),
                title: "Dinner".to_string(),
                created_at: Utc::now(),
            })
            .await
            .expect("insert session");
        pool
    }

    fn message(role: &str, content: &str) -> NewMessage {
        NewMessage {
            session_id: "s-1".to_string(),
            role: role.to_string(),
            content: content.to_string(),
            tool_calls: None,
        }
    }

    #[tokio::test]
    async fn recent_messages_returns_last_n_in_ascending_order() {
        let repo = SqlConversationRepository::new(setup().await);

        for index in 0..12 {
            let role = if index % 2 == 0 { "user" } else { "assistant" };
            repo.insert_message(message(role, &format!("message {index}")))
                .await
                .expect("insert message");
        }

        let recent = repo.recent_messages("s-1", 10).await.expect("recent");
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "message 2");
        assert_eq!(recent[9].content, "message 11");
    }

    #[tokio::test]
    async fn tool_rows_are_not_replayed_as_history() {
        let repo = SqlConversationRepository::new(setup().await);

        repo.insert_message(message("user", "find tacos")).await.expect("insert");
        repo.insert_message(NewMessage {
            tool_calls: Some(serde_json::json!([{ "name": "search_recipes" }])),
            ..message("tool", "{\"recipes\":[]}")
        })
        .await
        .expect("insert tool row");

        let recent = repo.recent_messages("s-1", 10).await.expect("recent");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].role, "user");
    }
}
