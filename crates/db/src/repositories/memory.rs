use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use souschef_core::domain::recipe::RecipeSummary;
use souschef_core::domain::reference::{AllergenEntry, FoodSafetyRule, IngredientAlias};
use souschef_core::domain::session::{
    ConversationSession, CookingSession, NewMessage, StoredMessage,
};
use souschef_core::domain::usage::UsageLogRow;
use souschef_core::domain::user::Language;

use super::{
    ConversationRepository, CookingContextRow, CookingSessionRepository, ProfileRepository,
    ProfileRow, RecipeQuery, RecipeRepository, ReferenceRepository, RepositoryError,
    SessionRepository, UsageRepository,
};

#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<HashMap<String, ProfileRow>>,
    cooking_contexts: RwLock<HashMap<String, CookingContextRow>>,
    unavailable: AtomicBool,
}

impl InMemoryProfileRepository {
    pub async fn insert_profile(&self, user_id: &str, row: ProfileRow) {
        self.profiles.write().await.insert(user_id.to_string(), row);
    }

    pub async fn insert_cooking_context(&self, user_id: &str, row: CookingContextRow) {
        self.cooking_contexts.write().await.insert(user_id.to_string(), row);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("profile store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn find_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, RepositoryError> {
        self.check_available()?;
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn find_cooking_context(
        &self,
        user_id: &str,
    ) -> Result<Option<CookingContextRow>, RepositoryError> {
        self.check_available()?;
        Ok(self.cooking_contexts.read().await.get(user_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    messages: RwLock<Vec<(NewMessage, StoredMessage)>>,
    unavailable: AtomicBool,
}

impl InMemoryConversationRepository {
    pub async fn messages_for(&self, session_id: &str) -> Vec<NewMessage> {
        self.messages
            .read()
            .await
            .iter()
            .filter(|(message, _)| message.session_id == session_id)
            .map(|(message, _)| message.clone())
            .collect()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn recent_messages(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("conversation store offline".to_string()));
        }
        let messages = self.messages.read().await;
        let matching = messages
            .iter()
            .filter(|(message, _)| {
                message.session_id == session_id
                    && matches!(message.role.as_str(), "user" | "assistant")
            })
            .map(|(_, stored)| stored.clone())
            .collect::<Vec<_>>();
        let skip = matching.len().saturating_sub(limit as usize);
        Ok(matching.into_iter().skip(skip).collect())
    }

    async fn insert_message(&self, message: NewMessage) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("conversation store offline".to_string()));
        }
        let stored = StoredMessage {
            role: message.role.clone(),
            content: message.content.clone(),
            created_at: Utc::now(),
        };
        self.messages.write().await.push((message, stored));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, ConversationSession>>,
}

impl InMemorySessionRepository {
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_session(
        &self,
        session_id: &str,
    ) -> Result<Option<ConversationSession>, RepositoryError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn insert_session(&self, session: ConversationSession) -> Result<(), RepositoryError> {
        self.sessions.write().await.insert(session.id.clone(), session);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCookingSessionRepository {
    sessions: RwLock<Vec<CookingSession>>,
}

impl InMemoryCookingSessionRepository {
    pub async fn insert(&self, session: CookingSession) {
        self.sessions.write().await.push(session);
    }

    pub async fn snapshot(&self) -> Vec<CookingSession> {
        self.sessions.read().await.clone()
    }
}

#[async_trait::async_trait]
impl CookingSessionRepository for InMemoryCookingSessionRepository {
    async fn latest_in_progress(
        &self,
        user_id: &str,
    ) -> Result<Option<CookingSession>, RepositoryError> {
        Ok(self
            .sessions
            .read()
            .await
            .iter()
            .filter(|session| session.user_id == user_id && !session.completed && !session.abandoned)
            .max_by_key(|session| session.last_active_at)
            .cloned())
    }
}

/// Reference tables held in memory. `baseline()` mirrors the seed migration
/// closely enough for service-level tests.
#[derive(Default)]
pub struct InMemoryReferenceRepository {
    aliases: Vec<IngredientAlias>,
    allergens: Vec<AllergenEntry>,
    rules: Vec<FoodSafetyRule>,
    unavailable: AtomicBool,
    alias_reads: AtomicUsize,
    allergen_reads: AtomicUsize,
    rule_reads: AtomicUsize,
}

impl InMemoryReferenceRepository {
    pub fn new(
        aliases: Vec<IngredientAlias>,
        allergens: Vec<AllergenEntry>,
        rules: Vec<FoodSafetyRule>,
    ) -> Self {
        Self { aliases, allergens, rules, ..Self::default() }
    }

    pub fn baseline() -> Self {
        let alias = |canonical: &str, alias: &str, language: Language| IngredientAlias {
            canonical: canonical.to_string(),
            alias: alias.to_string(),
            language,
        };
        let allergen = |category: &str, canonical: &str, en: &str, es: &str| AllergenEntry {
            category: category.to_string(),
            ingredient_canonical: canonical.to_string(),
            name_en: en.to_string(),
            name_es: es.to_string(),
        };
        let rule = |canonical: &str, category: &str, c: i32, f: i32, minutes: Option<u32>| {
            FoodSafetyRule {
                ingredient_canonical: canonical.to_string(),
                category: category.to_string(),
                min_temp_c: c,
                min_temp_f: f,
                min_cook_minutes: minutes,
            }
        };

        Self::new(
            vec![
                alias("ground_beef", "ground beef", Language::En),
                alias("ground_beef", "carne molida", Language::Es),
                alias("beef", "beef steak", Language::En),
                alias("beef", "bistec", Language::Es),
                alias("chicken", "chicken breast", Language::En),
                alias("chicken", "pollo", Language::Es),
                alias("milk", "leche", Language::Es),
                alias("butter", "mantequilla", Language::Es),
                alias("peanut", "peanuts", Language::En),
                alias("peanut_butter", "peanut butter", Language::En),
                alias("shrimp", "camarones", Language::Es),
                alias("wheat_flour", "flour", Language::En),
            ],
            vec![
                allergen("dairy", "milk", "milk", "leche"),
                allergen("dairy", "butter", "butter", "mantequilla"),
                allergen("dairy", "cheese", "cheese", "queso"),
                allergen("nuts", "peanut", "peanut", "cacahuate"),
                allergen("nuts", "almond", "almond", "almendra"),
                allergen("gluten", "wheat", "wheat", "trigo"),
                allergen("shellfish", "shrimp", "shrimp", "camarón"),
            ],
            vec![
                rule("ground_beef", "ground_meat", 70, 160, None),
                rule("beef", "whole_cut", 63, 145, Some(3)),
                rule("chicken", "poultry", 74, 165, None),
                rule("shrimp", "seafood", 63, 145, None),
            ],
        )
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// How many times each table was read: `(aliases, allergens, rules)`.
    pub fn read_counts(&self) -> (usize, usize, usize) {
        (
            self.alias_reads.load(Ordering::SeqCst),
            self.allergen_reads.load(Ordering::SeqCst),
            self.rule_reads.load(Ordering::SeqCst),
        )
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("reference store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReferenceRepository for InMemoryReferenceRepository {
    async fn ingredient_aliases(&self) -> Result<Vec<IngredientAlias>, RepositoryError> {
        self.alias_reads.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.aliases.clone())
    }

    async fn allergen_groups(&self) -> Result<Vec<AllergenEntry>, RepositoryError> {
        self.allergen_reads.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.allergens.clone())
    }

    async fn food_safety_rules(&self) -> Result<Vec<FoodSafetyRule>, RepositoryError> {
        self.rule_reads.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.rules.clone())
    }
}

#[derive(Default)]
pub struct InMemoryRecipeRepository {
    recipes: RwLock<Vec<RecipeSummary>>,
    unavailable: AtomicBool,
}

impl InMemoryRecipeRepository {
    pub async fn insert(&self, recipe: RecipeSummary) {
        self.recipes.write().await.push(recipe);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl RecipeRepository for InMemoryRecipeRepository {
    async fn search(&self, query: &RecipeQuery) -> Result<Vec<RecipeSummary>, RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("recipe store offline".to_string()));
        }
        Ok(self
            .recipes
            .read()
            .await
            .iter()
            .filter(|recipe| query.matches(recipe))
            .take(query.limit.max(1) as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryUsageRepository {
    rows: RwLock<HashMap<(String, String, u32), UsageLogRow>>,
    unavailable: AtomicBool,
}

impl InMemoryUsageRepository {
    pub async fn rows(&self) -> Vec<UsageLogRow> {
        let mut rows = self.rows.read().await.values().cloned().collect::<Vec<_>>();
        rows.sort_by(|left, right| left.natural_key().cmp(&right.natural_key()));
        rows
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn upsert_usage(&self, row: UsageLogRow) -> Result<bool, RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("usage store offline".to_string()));
        }
        let mut rows = self.rows.write().await;
        let key = row.natural_key();
        if rows.contains_key(&key) {
            return Ok(false);
        }
        rows.insert(key, row);
        Ok(true)
    }
}
