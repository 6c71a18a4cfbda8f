use serde::{Deserialize, Serialize};

/// A catalog recipe as returned by search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub cuisine: Option<String>,
    pub total_time_minutes: Option<u32>,
    pub ingredients: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl RecipeIngredient {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), quantity: None, unit: None }
    }
}

/// A recipe produced on demand for one user, before safety screening.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedRecipe {
    pub name: String,
    pub servings: u32,
    pub ingredients: Vec<RecipeIngredient>,
    pub steps: Vec<String>,
    #[serde(default)]
    pub total_time_minutes: Option<u32>,
}
