use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use souschef_core::domain::session::{ConversationSession, NewMessage};
use souschef_core::domain::user::HistoryRole;
use souschef_core::errors::ApplicationError;
use souschef_core::text::session_title;
use souschef_db::repositories::{ConversationRepository, RepositoryError, SessionRepository};

#[derive(Debug, Error)]
pub enum SessionError {
    /// The session does not exist or belongs to someone else. The two cases
    /// are deliberately indistinguishable.
    #[error("session not found")]
    NotOwned,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<SessionError> for ApplicationError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::NotOwned => ApplicationError::NotFound("session".to_string()),
            SessionError::Repository(error) => ApplicationError::Persistence(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnsuredSession {
    pub session_id: String,
    pub created: bool,
}

#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<dyn SessionRepository>,
    conversations: Arc<dyn ConversationRepository>,
}

impl SessionManager {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        conversations: Arc<dyn ConversationRepository>,
    ) -> Self {
        Self { sessions, conversations }
    }

    pub async fn ensure_session(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        first_message: Option<&str>,
    ) -> Result<EnsuredSession, SessionError> {
        if let Some(session_id) = session_id {
            return match self.sessions.find_session(session_id).await? {
                Some(session) if session.user_id == user_id => {
                    Ok(EnsuredSession { session_id: session.id, created: false })
                }
                _ => Err(SessionError::NotOwned),
            };
        }

        let session = ConversationSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: session_title(first_message),
            created_at: Utc::now(),
        };
        let session_id = session.id.clone();
        self.sessions.insert_session(session).await?;

        info!(
            event_name = "session.created",
            user_id,
            session_id = %session_id,
            "conversation session created"
        );
        Ok(EnsuredSession { session_id, created: true })
    }

    pub async fn persist_turn(
        &self,
        session_id: &str,
        role: HistoryRole,
        content: &str,
        tool_calls: Option<Value>,
    ) -> Result<(), SessionError> {
        self.conversations
            .insert_message(NewMessage {
                session_id: session_id.to_string(),
                role: role.as_str().to_string(),
                content: content.to_string(),
                tool_calls,
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;

    use souschef_core::domain::session::ConversationSession;
    use souschef_core::domain::user::HistoryRole;
    use souschef_core::errors::{ApplicationError, InterfaceError};
    use souschef_db::repositories::{
        InMemoryConversationRepository, InMemorySessionRepository, SessionRepository,
    };

    use super::{SessionError, SessionManager};

    fn manager() -> (Arc<InMemorySessionRepository>, Arc<InMemoryConversationRepository>, SessionManager)
    {
        let sessions = Arc::new(InMemorySessionRepository::default());
        let conversations = Arc::new(InMemoryConversationRepository::default());
        let manager = SessionManager::new(sessions.clone(), conversations.clone());
        (sessions, conversations, manager)
    }

    async fn seed_session(sessions: &InMemorySessionRepository, id: &str, owner: &str) {
        sessions
            .insert_session(ConversationSession {
                id: id.to_string(),
                user_id: owner.to_string(),
                title: "Dinner".to_string(),
                created_at: Utc::now(),
            })
            .await
            .expect("seed session");
    }

    #[tokio::test]
    async fn new_session_is_titled_from_the_first_message() {
        let (sessions, _, manager) = manager();

        let ensured = manager
            .ensure_session("user-1", None, Some("  What can I   make with leftover rice?  "))
            .await
            .expect("session");

        assert!(ensured.created);
        let stored = sessions.find_session(&ensured.session_id).await.expect("find").expect("row");
        assert_eq!(stored.title, "What can I make with leftover rice?");
        assert_eq!(stored.user_id, "user-1");
    }

    #[tokio::test]
    async fn owned_session_is_reused() {
        let (sessions, _, manager) = manager();
        seed_session(&sessions, "s-1", "user-1").await;

        let ensured = manager.ensure_session("user-1", Some("s-1"), Some("hi")).await.expect("session");

        assert_eq!(ensured.session_id, "s-1");
        assert!(!ensured.created);
        assert_eq!(sessions.len().await, 1);
    }

    #[tokio::test]
    async fn foreign_session_is_an_ownership_error() {
        let (sessions, _, manager) = manager();
        seed_session(&sessions, "s-1", "someone-else").await;

        let error = manager.ensure_session("user-1", Some("s-1"), None).await.expect_err("foreign");

        assert!(matches!(error, SessionError::NotOwned));
        let interface = ApplicationError::from(error).into_interface("req-1");
        assert!(matches!(interface, InterfaceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn unknown_session_is_indistinguishable_from_foreign() {
        let (_, _, manager) = manager();

        let error = manager.ensure_session("user-1", Some("missing"), None).await.expect_err("missing");

        assert!(matches!(error, SessionError::NotOwned));
        assert_eq!(error.to_string(), "session not found");
    }

    #[tokio::test]
    async fn turns_are_persisted_with_their_role() {
        let (_, conversations, manager) = manager();

        manager.persist_turn("s-1", HistoryRole::User, "hola", None).await.expect("user turn");
        manager
            .persist_turn(
                "s-1",
                HistoryRole::Assistant,
                "¡Hola!",
                Some(json!([{"name": "search_recipes"}])),
            )
            .await
            .expect("assistant turn");

        let stored = conversations.messages_for("s-1").await;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].role, "assistant");
        assert!(stored[1].tool_calls.is_some());
    }
}
