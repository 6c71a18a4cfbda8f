use sqlx::{sqlite::SqliteRow, Row};

use souschef_core::domain::session::{ConversationSession, CookingSession, RecipeKind};

use super::{
    format_timestamp, parse_timestamp, CookingSessionRepository, RepositoryError,
    SessionRepository,
};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn find_session(
        &self,
        session_id: &str,
    ) -> Result<Option<ConversationSession>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, title, created_at FROM conversation_sessions WHERE id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<ConversationSession, RepositoryError> {
            let created_at: String = row.try_get("created_at")?;
            Ok(ConversationSession {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                title: row.try_get("title")?,
                created_at: parse_timestamp(&created_at, "created_at")?,
            })
        })
        .transpose()
    }

    async fn insert_session(&self, session: ConversationSession) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO conversation_sessions (id, user_id, title, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.title)
        .bind(format_timestamp(session.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct SqlCookingSessionRepository {
    pool: DbPool,
}

impl SqlCookingSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, session: &CookingSession) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO cooking_sessions
                (id, user_id, recipe_id, recipe_kind, recipe_name, current_step, total_steps,
                 last_active_at, completed, abandoned)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                current_step = excluded.current_step,
                last_active_at = excluded.last_active_at,
                completed = excluded.completed,
                abandoned = excluded.abandoned",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.recipe_id)
        .bind(session.recipe_kind.as_str())
        .bind(&session.recipe_name)
        .bind(session.current_step)
        .bind(session.total_steps)
        .bind(format_timestamp(session.last_active_at))
        .bind(session.completed)
        .bind(session.abandoned)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn cooking_session_from_row(row: SqliteRow) -> Result<CookingSession, RepositoryError> {
    let recipe_kind: String = row.try_get("recipe_kind")?;
    let last_active_at: String = row.try_get("last_active_at")?;
    let current_step: i64 = row.try_get("current_step")?;
    let total_steps: i64 = row.try_get("total_steps")?;

    Ok(CookingSession {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        recipe_id: row.try_get("recipe_id")?,
        recipe_kind: RecipeKind::parse(&recipe_kind).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown recipe kind `{recipe_kind}`"))
        })?,
        recipe_name: row.try_get("recipe_name")?,
        current_step: u32::try_from(current_step)
            .map_err(|error| RepositoryError::Decode(format!("current_step: {error}")))?,
        total_steps: u32::try_from(total_steps)
            .map_err(|error| RepositoryError::Decode(format!("total_steps: {error}")))?,
        last_active_at: parse_timestamp(&last_active_at, "last_active_at")?,
        completed: row.try_get("completed")?,
        abandoned: row.try_get("abandoned")?,
    })
}

#[async_trait::async_trait]
impl CookingSessionRepository for SqlCookingSessionRepository {
    async fn latest_in_progress(
        &self,
        user_id: &str,
    ) -> Result<Option<CookingSession>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, recipe_id, recipe_kind, recipe_name, current_step, total_steps,
                    last_active_at, completed, abandoned
             FROM cooking_sessions
             WHERE user_id = ? AND completed = 0 AND abandoned = 0
             ORDER BY last_active_at DESC
             LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(cooking_session_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use souschef_core::domain::session::{ConversationSession, CookingSession, RecipeKind};

    use super::{SqlCookingSessionRepository, SqlSessionRepository};
    use crate::repositories::{CookingSessionRepository, SessionRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn cooking_session(id: &str, hours_idle: i64, completed: bool) -> CookingSession {
        CookingSession {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            recipe_id: format!("recipe-{id}"),
            recipe_kind: RecipeKind::Custom,
            recipe_name: "Chili".to_string(),
            current_step: 3,
            total_steps: 8,
            last_active_at: Utc::now() - Duration::hours(hours_idle),
            completed,
            abandoned: false,
        }
    }

    #[tokio::test]
    async fn session_round_trip_preserves_owner() {
        let repo = SqlSessionRepository::new(setup().await);
        let session = ConversationSession {
            id: "s-1".to_string(),
            user_id: "user-1".to_string(),
            title: "Weeknight dinners".to_string(),
            created_at: Utc::now(),
        };

        repo.insert_session(session.clone()).await.expect("insert");
        let found = repo.find_session("s-1").await.expect("find").expect("session exists");

        assert_eq!(found.user_id, "user-1");
        assert_eq!(found.title, session.title);
        assert_eq!(repo.find_session("missing").await.expect("find"), None);
    }

    #[tokio::test]
    async fn latest_in_progress_skips_finished_sessions() {
        let repo = SqlCookingSessionRepository::new(setup().await);

        repo.save(&cooking_session("old", 5, false)).await.expect("save old");
        repo.save(&cooking_session("done", 1, true)).await.expect("save done");
        repo.save(&cooking_session("recent", 2, false)).await.expect("save recent");

        let latest = repo.latest_in_progress("user-1").await.expect("query").expect("session");
        assert_eq!(latest.id, "recent");
        assert_eq!(latest.recipe_kind, RecipeKind::Custom);
        assert_eq!(latest.current_step, 3);
    }
}
