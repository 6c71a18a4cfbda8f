use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub tool_calls: Option<serde_json::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeKind {
    Catalog,
    Custom,
}

impl RecipeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "catalog" => Some(Self::Catalog),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Step-by-step cooking progress owned by the cooking surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookingSession {
    pub id: String,
    pub user_id: String,
    pub recipe_id: String,
    pub recipe_kind: RecipeKind,
    pub recipe_name: String,
    pub current_step: u32,
    pub total_steps: u32,
    pub last_active_at: DateTime<Utc>,
    pub completed: bool,
    pub abandoned: bool,
}

impl CookingSession {
    pub fn is_resumable_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        !self.completed && !self.abandoned && now - self.last_active_at <= window
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumableSession {
    pub session_id: String,
    pub recipe_id: String,
    pub recipe_kind: RecipeKind,
    pub recipe_name: String,
    pub current_step: u32,
    pub total_steps: u32,
    pub last_active_at: DateTime<Utc>,
}

impl From<CookingSession> for ResumableSession {
    fn from(session: CookingSession) -> Self {
        Self {
            session_id: session.id,
            recipe_id: session.recipe_id,
            recipe_kind: session.recipe_kind,
            recipe_name: session.recipe_name,
            current_step: session.current_step,
            total_steps: session.total_steps,
            last_active_at: session.last_active_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{CookingSession, RecipeKind};

    fn session(hours_idle: i64) -> CookingSession {
        let now = Utc::now();
        CookingSession {
            id: "cs-1".to_string(),
            user_id: "user-1".to_string(),
            recipe_id: "r-1".to_string(),
            recipe_kind: RecipeKind::Catalog,
            recipe_name: "Tacos".to_string(),
            current_step: 2,
            total_steps: 6,
            last_active_at: now - Duration::hours(hours_idle),
            completed: false,
            abandoned: false,
        }
    }

    #[test]
    fn freshness_window_bounds_resumability() {
        let now = Utc::now();
        assert!(session(23).is_resumable_at(now, Duration::hours(24)));
        assert!(!session(25).is_resumable_at(now, Duration::hours(24)));

        let mut finished = session(1);
        finished.completed = true;
        assert!(!finished.is_resumable_at(now, Duration::hours(24)));
    }
}
