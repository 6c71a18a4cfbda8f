use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use souschef_db::repositories::{RecipeQuery, RecipeRepository};

use super::{parse_args, ShapedResult, Tool, ToolContext, ToolError, ToolName};
use crate::safety::SafetyValidator;

const DEFAULT_LIMIT: u32 = 5;
const MAX_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    cuisine: Option<String>,
    #[serde(default)]
    max_total_minutes: Option<u32>,
    #[serde(default)]
    limit: Option<u32>,
}

impl SearchArgs {
    fn into_query(self) -> Result<RecipeQuery, ToolError> {
        let text = self.query.trim().to_string();
        if text.is_empty() {
            return Err(ToolError::invalid_arguments("`query` must not be empty"));
        }
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ToolError::invalid_arguments(format!(
                "`limit` must be between 1 and {MAX_LIMIT}"
            )));
        }
        Ok(RecipeQuery {
            text,
            cuisine: self.cuisine.map(|cuisine| cuisine.trim().to_string()).filter(|c| !c.is_empty()),
            max_total_minutes: self.max_total_minutes,
            limit,
        })
    }
}

/// Catalog search, screened against the user's restrictions before the
/// model sees any result.
pub struct SearchRecipesTool {
    recipes: Arc<dyn RecipeRepository>,
    safety: Arc<SafetyValidator>,
}

impl SearchRecipesTool {
    pub fn new(recipes: Arc<dyn RecipeRepository>, safety: Arc<SafetyValidator>) -> Self {
        Self { recipes, safety }
    }
}

#[async_trait]
impl Tool for SearchRecipesTool {
    fn name(&self) -> ToolName {
        ToolName::SearchRecipes
    }

    fn description(&self) -> &'static str {
        "Search the recipe catalog by dish, ingredient or cuisine."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Dish, ingredient or keyword"},
                "cuisine": {"type": "string"},
                "max_total_minutes": {"type": "integer", "minimum": 1},
                "limit": {"type": "integer", "minimum": 1, "maximum": MAX_LIMIT},
            },
            "required": ["query"],
        })
    }

    fn allowed_in_voice(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, context: &ToolContext) -> Result<Value, ToolError> {
        let query = parse_args::<SearchArgs>(args)?.into_query()?;

        let found = match self.recipes.search(&query).await {
            Ok(found) => found,
            Err(error) => {
                warn!(
                    event_name = "tool.search_recipes.store_failed",
                    correlation_id = %context.request_id,
                    error = %error,
                    "recipe search failed; returning no results"
                );
                Vec::new()
            }
        };

        let screen = context.user.allergen_screen();
        let filtered = self.safety.filter_by_allergens(found, &screen).await;

        let mut result = json!({ "recipes": filtered.recipes });
        if filtered.verification_unavailable {
            result["allergen_verification"] = json!("unavailable");
        }
        Ok(result)
    }

    fn shape_result(&self, result: &Value) -> ShapedResult {
        ShapedResult::Recipes(
            result.get("recipes").and_then(Value::as_array).cloned().unwrap_or_default(),
        )
    }
}
