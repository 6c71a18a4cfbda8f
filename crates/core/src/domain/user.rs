use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
        }
    }

    /// Unknown or missing codes fall back to English.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(|value| value.trim().to_ascii_lowercase()) {
            Some(code) if code == "es" || code.starts_with("es-") => Self::Es,
            _ => Self::En,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementSystem {
    Imperial,
    Metric,
}

impl MeasurementSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imperial => "imperial",
            Self::Metric => "metric",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "imperial" => Some(Self::Imperial),
            "metric" => Some(Self::Metric),
            _ => None,
        }
    }

    /// An explicit preference wins; otherwise Spanish speakers get metric.
    pub fn resolve(preference: Option<&str>, language: Language) -> Self {
        preference.and_then(Self::parse).unwrap_or(match language {
            Language::Es => Self::Metric,
            Language::En => Self::Imperial,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

impl HistoryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: HistoryRole,
    pub content: String,
}

/// Everything a single turn needs to know about the user. Built fresh per
/// request and never persisted as a unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub language: Language,
    pub measurement_system: MeasurementSystem,
    pub dietary_restrictions: Vec<String>,
    pub ingredient_dislikes: Vec<String>,
    pub diet_types: Vec<String>,
    pub custom_allergies: Vec<String>,
    pub kitchen_equipment: Vec<String>,
    pub skill_level: Option<String>,
    pub household_size: Option<u32>,
    pub history: Vec<HistoryMessage>,
}

impl UserContext {
    pub fn with_defaults(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            language: Language::En,
            measurement_system: MeasurementSystem::Imperial,
            dietary_restrictions: Vec::new(),
            ingredient_dislikes: Vec::new(),
            diet_types: Vec::new(),
            custom_allergies: Vec::new(),
            kitchen_equipment: Vec::new(),
            skill_level: None,
            household_size: None,
            history: Vec::new(),
        }
    }

    /// Restriction categories plus free-text custom allergies, which is what
    /// allergen screening runs against.
    pub fn allergen_screen(&self) -> Vec<String> {
        let mut screen = self.dietary_restrictions.clone();
        for allergy in &self.custom_allergies {
            if !screen.contains(allergy) {
                screen.push(allergy.clone());
            }
        }
        screen
    }
}
