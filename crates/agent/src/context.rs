use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use souschef_core::config::AgentConfig;
use souschef_core::domain::session::ResumableSession;
use souschef_core::domain::user::{
    HistoryMessage, HistoryRole, Language, MeasurementSystem, UserContext,
};
use souschef_core::text::sanitize_message;
use souschef_db::repositories::{
    ConversationRepository, CookingContextRow, CookingSessionRepository, ProfileRepository,
    ProfileRow,
};

/// Assembles the per-request [`UserContext`]. Missing or unreadable rows
/// degrade to defaults; building a context never fails.
#[derive(Clone)]
pub struct ContextBuilder {
    profiles: Arc<dyn ProfileRepository>,
    conversations: Arc<dyn ConversationRepository>,
    cooking_sessions: Arc<dyn CookingSessionRepository>,
    settings: AgentConfig,
}

impl ContextBuilder {
    pub fn new(
        profiles: Arc<dyn ProfileRepository>,
        conversations: Arc<dyn ConversationRepository>,
        cooking_sessions: Arc<dyn CookingSessionRepository>,
        settings: AgentConfig,
    ) -> Self {
        Self { profiles, conversations, cooking_sessions, settings }
    }

    pub async fn build_context(&self, user_id: &str, session_id: Option<&str>) -> UserContext {
        let (profile, cooking, history) = tokio::join!(
            self.profiles.find_profile(user_id),
            self.profiles.find_cooking_context(user_id),
            self.load_history(session_id),
        );

        let profile = profile.unwrap_or_else(|error| {
            warn!(
                event_name = "context.profile.read_failed",
                user_id,
                error = %error,
                "profile unavailable; using defaults"
            );
            None
        });
        let cooking = cooking.unwrap_or_else(|error| {
            warn!(
                event_name = "context.cooking_context.read_failed",
                user_id,
                error = %error,
                "cooking context unavailable; using defaults"
            );
            None
        });

        merge_context(user_id, profile.unwrap_or_default(), cooking.unwrap_or_default(), history)
    }

    pub async fn get_resumable_cooking_session(&self, user_id: &str) -> Option<ResumableSession> {
        self.get_resumable_cooking_session_at(user_id, Utc::now()).await
    }

    /// Read-only: a stale session is reported as not resumable but is left
    /// untouched in the store.
    pub async fn get_resumable_cooking_session_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Option<ResumableSession> {
        let latest = match self.cooking_sessions.latest_in_progress(user_id).await {
            Ok(latest) => latest?,
            Err(error) => {
                warn!(
                    event_name = "context.cooking_session.read_failed",
                    user_id,
                    error = %error,
                    "cooking session lookup failed"
                );
                return None;
            }
        };

        let window = Duration::hours(self.settings.resumable_window_hours);
        latest.is_resumable_at(now, window).then(|| ResumableSession::from(latest))
    }

    async fn load_history(&self, session_id: Option<&str>) -> Vec<HistoryMessage> {
        let Some(session_id) = session_id else {
            return Vec::new();
        };

        match self.conversations.recent_messages(session_id, self.settings.history_limit).await {
            Ok(messages) => messages
                .into_iter()
                .filter_map(|message| {
                    let role = HistoryRole::parse(&message.role)?;
                    Some(HistoryMessage {
                        role,
                        content: sanitize_message(&message.content, self.settings.max_message_chars),
                    })
                })
                .collect(),
            Err(error) => {
                warn!(
                    event_name = "context.history.read_failed",
                    session_id,
                    error = %error,
                    "conversation history unavailable; continuing without it"
                );
                Vec::new()
            }
        }
    }
}

fn merge_context(
    user_id: &str,
    profile: ProfileRow,
    cooking: CookingContextRow,
    history: Vec<HistoryMessage>,
) -> UserContext {
    let language = Language::parse_or_default(profile.language.as_deref());

    UserContext {
        user_id: user_id.to_string(),
        language,
        measurement_system: MeasurementSystem::resolve(cooking.measurement_system.as_deref(), language),
        dietary_restrictions: canonical_union([profile.dietary_restrictions, cooking.dietary_restrictions]),
        ingredient_dislikes: canonical_union([cooking.ingredient_dislikes]),
        diet_types: canonical_union([profile.diet_types]),
        custom_allergies: canonical_union([cooking.custom_allergies]),
        kitchen_equipment: canonical_union([cooking.kitchen_equipment]),
        skill_level: cooking.skill_level.filter(|level| !level.trim().is_empty()),
        household_size: cooking.household_size.filter(|size| *size > 0),
        history,
    }
}

fn canonical_union<const N: usize>(sources: [Vec<String>; N]) -> Vec<String> {
    sources
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use souschef_core::config::AgentConfig;
    use souschef_core::domain::session::{CookingSession, NewMessage, RecipeKind};
    use souschef_core::domain::user::{HistoryRole, Language, MeasurementSystem};
    use souschef_db::repositories::{
        ConversationRepository, CookingContextRow, InMemoryConversationRepository,
        InMemoryCookingSessionRepository, InMemoryProfileRepository, ProfileRow,
    };

    use super::ContextBuilder;

    struct Fixture {
        profiles: Arc<InMemoryProfileRepository>,
        conversations: Arc<InMemoryConversationRepository>,
        cooking: Arc<InMemoryCookingSessionRepository>,
        builder: ContextBuilder,
    }

    fn fixture() -> Fixture {
        let profiles = Arc::new(InMemoryProfileRepository::default());
        let conversations = Arc::new(InMemoryConversationRepository::default());
        let cooking = Arc::new(InMemoryCookingSessionRepository::default());
        let builder = ContextBuilder::new(
            profiles.clone(),
            conversations.clone(),
            cooking.clone(),
            AgentConfig::default(),
        );
        Fixture { profiles, conversations, cooking, builder }
    }

    fn cooking_session(hours_idle: i64) -> CookingSession {
        CookingSession {
            id: "cs-1".to_string(),
            user_id: "user-1".to_string(),
            recipe_id: "r-1".to_string(),
            recipe_kind: RecipeKind::Catalog,
            recipe_name: "Pozole".to_string(),
            current_step: 2,
            total_steps: 9,
            last_active_at: Utc::now() - Duration::hours(hours_idle),
            completed: false,
            abandoned: false,
        }
    }

    #[tokio::test]
    async fn missing_profile_falls_back_to_defaults() {
        let fixture = fixture();

        let context = fixture.builder.build_context("user-1", None).await;

        assert_eq!(context.language, Language::En);
        assert_eq!(context.measurement_system, MeasurementSystem::Imperial);
        assert!(context.dietary_restrictions.is_empty());
        assert!(context.ingredient_dislikes.is_empty());
        assert!(context.history.is_empty());
    }

    #[tokio::test]
    async fn unreadable_profile_store_still_builds_a_context() {
        let fixture = fixture();
        fixture.profiles.set_unavailable(true);

        let context = fixture.builder.build_context("user-1", None).await;

        assert_eq!(context.user_id, "user-1");
        assert_eq!(context.language, Language::En);
    }

    #[tokio::test]
    async fn restrictions_merge_as_a_set_union_across_sources() {
        let fixture = fixture();
        fixture
            .profiles
            .insert_profile(
                "user-1",
                ProfileRow {
                    language: Some("es".to_string()),
                    dietary_restrictions: vec!["Dairy".to_string(), "nuts".to_string()],
                    diet_types: vec!["vegetarian".to_string()],
                },
            )
            .await;
        fixture
            .profiles
            .insert_cooking_context(
                "user-1",
                CookingContextRow {
                    dietary_restrictions: vec![" dairy ".to_string(), "gluten".to_string()],
                    household_size: Some(4),
                    ..CookingContextRow::default()
                },
            )
            .await;

        let context = fixture.builder.build_context("user-1", None).await;

        assert_eq!(context.dietary_restrictions, vec!["dairy", "gluten", "nuts"]);
        assert_eq!(context.language, Language::Es);
        assert_eq!(context.measurement_system, MeasurementSystem::Metric);
        assert_eq!(context.household_size, Some(4));
    }

    #[tokio::test]
    async fn explicit_measurement_preference_overrides_language_default() {
        let fixture = fixture();
        fixture
            .profiles
            .insert_profile(
                "user-1",
                ProfileRow { language: Some("es".to_string()), ..ProfileRow::default() },
            )
            .await;
        fixture
            .profiles
            .insert_cooking_context(
                "user-1",
                CookingContextRow {
                    measurement_system: Some("imperial".to_string()),
                    ..CookingContextRow::default()
                },
            )
            .await;

        let context = fixture.builder.build_context("user-1", None).await;
        assert_eq!(context.measurement_system, MeasurementSystem::Imperial);
    }

    #[tokio::test]
    async fn history_is_bounded_ordered_and_sanitized() {
        let fixture = fixture();
        for index in 0..12 {
            fixture
                .conversations
                .insert_message(NewMessage {
                    session_id: "s-1".to_string(),
                    role: if index % 2 == 0 { "user" } else { "assistant" }.to_string(),
                    content: format!("turn {index}\u{0007}"),
                    tool_calls: None,
                })
                .await
                .expect("insert");
        }

        let context = fixture.builder.build_context("user-1", Some("s-1")).await;

        assert_eq!(context.history.len(), 10);
        assert_eq!(context.history[0].content, "turn 2");
        assert_eq!(context.history[0].role, HistoryRole::User);
        assert_eq!(context.history[9].content, "turn 11");
    }

    #[tokio::test]
    async fn long_history_messages_are_truncated() {
        let fixture = fixture();
        fixture
            .conversations
            .insert_message(NewMessage {
                session_id: "s-1".to_string(),
                role: "user".to_string(),
                content: "x".repeat(2500),
                tool_calls: None,
            })
            .await
            .expect("insert");

        let context = fixture.builder.build_context("user-1", Some("s-1")).await;

        assert_eq!(context.history[0].content.chars().count(), 2003);
        assert!(context.history[0].content.ends_with("..."));
    }

    #[tokio::test]
    async fn recent_in_progress_session_is_resumable() {
        let fixture = fixture();
        fixture.cooking.insert(cooking_session(2)).await;

        let resumable = fixture.builder.get_resumable_cooking_session("user-1").await;

        assert_eq!(resumable.map(|session| session.recipe_name), Some("Pozole".to_string()));
    }

    #[tokio::test]
    async fn stale_session_is_not_resumable_and_is_left_untouched() {
        let fixture = fixture();
        let stale = cooking_session(25);
        fixture.cooking.insert(stale.clone()).await;

        let resumable = fixture.builder.get_resumable_cooking_session("user-1").await;

        assert!(resumable.is_none());
        assert_eq!(fixture.cooking.snapshot().await, vec![stale]);
    }

    #[tokio::test]
    async fn resumability_uses_the_supplied_clock() {
        let fixture = fixture();
        let session = cooking_session(0);
        let last_active = session.last_active_at;
        fixture.cooking.insert(session).await;

        let inside = fixture
            .builder
            .get_resumable_cooking_session_at("user-1", last_active + Duration::hours(23))
            .await;
        let outside = fixture
            .builder
            .get_resumable_cooking_session_at("user-1", last_active + Duration::hours(25))
            .await;

        assert!(inside.is_some());
        assert!(outside.is_none());
    }
}
