use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use souschef_core::domain::recipe::RecipeSummary;
use souschef_core::domain::reference::{AllergenEntry, FoodSafetyRule, IngredientAlias};
use souschef_core::domain::session::{
    ConversationSession, CookingSession, NewMessage, StoredMessage,
};
use souschef_core::domain::usage::UsageLogRow;

pub mod conversation;
pub mod memory;
pub mod profile;
pub mod recipe;
pub mod reference;
pub mod session;
pub mod usage;

pub use conversation::SqlConversationRepository;
pub use memory::{
    InMemoryConversationRepository, InMemoryCookingSessionRepository, InMemoryProfileRepository,
    InMemoryRecipeRepository, InMemoryReferenceRepository, InMemorySessionRepository,
    InMemoryUsageRepository,
};
pub use profile::{CookingContextRow, ProfileRow, SqlProfileRepository};
pub use recipe::{RecipeQuery, SqlRecipeRepository};
pub use reference::SqlReferenceRepository;
pub use session::{SqlCookingSessionRepository, SqlSessionRepository};
pub use usage::SqlUsageRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Two independent reads over the user's profile tables.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, RepositoryError>;

    async fn find_cooking_context(
        &self,
        user_id: &str,
    ) -> Result<Option<CookingContextRow>, RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// The most recent `limit` messages, returned oldest first.
    async fn recent_messages(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError>;

    async fn insert_message(&self, message: NewMessage) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_session(
        &self,
        session_id: &str,
    ) -> Result<Option<ConversationSession>, RepositoryError>;

    async fn insert_session(&self, session: ConversationSession) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CookingSessionRepository: Send + Sync {
    /// Most recently active session that is neither completed nor abandoned.
    /// Read-only: callers decide freshness.
    async fn latest_in_progress(
        &self,
        user_id: &str,
    ) -> Result<Option<CookingSession>, RepositoryError>;
}

#[async_trait]
pub trait ReferenceRepository: Send + Sync {
    async fn ingredient_aliases(&self) -> Result<Vec<IngredientAlias>, RepositoryError>;
    async fn allergen_groups(&self) -> Result<Vec<AllergenEntry>, RepositoryError>;
    async fn food_safety_rules(&self) -> Result<Vec<FoodSafetyRule>, RepositoryError>;
}

#[async_trait]
pub trait RecipeRepository: Send + Sync {
    async fn search(&self, query: &RecipeQuery) -> Result<Vec<RecipeSummary>, RepositoryError>;
}

#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Returns `false` when a row with the same natural key already existed.
    async fn upsert_usage(&self, row: UsageLogRow) -> Result<bool, RepositoryError>;
}

pub(crate) fn decode_string_list(
    raw: Option<String>,
    column: &str,
) -> Result<Vec<String>, RepositoryError> {
    match raw {
        None => Ok(Vec::new()),
        Some(raw) if raw.trim().is_empty() => Ok(Vec::new()),
        Some(raw) => serde_json::from_str::<Vec<String>>(&raw)
            .map_err(|error| RepositoryError::Decode(format!("{column}: {error}"))),
    }
}

pub(crate) fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

/// Fixed-width UTC timestamps so lexical order in SQLite matches time order.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}
