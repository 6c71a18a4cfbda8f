use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::{parse_args, ShapedResult, Tool, ToolContext, ToolError, ToolName};
use crate::llm::{RecipeGenerator, RecipeRequest};
use crate::safety::SafetyValidator;

const MAX_INGREDIENTS: usize = 20;
const MAX_SERVINGS: u32 = 50;
const DEFAULT_SERVINGS: u32 = 2;

#[derive(Debug, Deserialize)]
struct CustomRecipeArgs {
    ingredients: Vec<String>,
    #[serde(default)]
    cuisine: Option<String>,
    #[serde(default)]
    servings: Option<u32>,
}

/// Generates a recipe from the user's ingredients, then screens the result
/// for allergens and cooking temperatures. Generator failures are surfaced.
pub struct GenerateCustomRecipeTool {
    generator: Arc<dyn RecipeGenerator>,
    safety: Arc<SafetyValidator>,
}

impl GenerateCustomRecipeTool {
    pub fn new(generator: Arc<dyn RecipeGenerator>, safety: Arc<SafetyValidator>) -> Self {
        Self { generator, safety }
    }
}

#[async_trait]
impl Tool for GenerateCustomRecipeTool {
    fn name(&self) -> ToolName {
        ToolName::GenerateCustomRecipe
    }

    fn description(&self) -> &'static str {
        "Create a new recipe from ingredients the user has on hand."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ingredients": {
                    "type": "array",
                    "items": {"type": "string"},
                    "minItems": 1,
                    "maxItems": MAX_INGREDIENTS,
                },
                "cuisine": {"type": "string"},
                "servings": {"type": "integer", "minimum": 1, "maximum": MAX_SERVINGS},
            },
            "required": ["ingredients"],
        })
    }

    fn allowed_in_voice(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, context: &ToolContext) -> Result<Value, ToolError> {
        let args = parse_args::<CustomRecipeArgs>(args)?;
        let ingredients = args
            .ingredients
            .into_iter()
            .map(|ingredient| ingredient.trim().to_string())
            .filter(|ingredient| !ingredient.is_empty())
            .collect::<Vec<_>>();
        if ingredients.is_empty() || ingredients.len() > MAX_INGREDIENTS {
            return Err(ToolError::invalid_arguments(format!(
                "`ingredients` must list between 1 and {MAX_INGREDIENTS} items"
            )));
        }
        let servings = args.servings.or(context.user.household_size).unwrap_or(DEFAULT_SERVINGS);
        if !(1..=MAX_SERVINGS).contains(&servings) {
            return Err(ToolError::invalid_arguments(format!(
                "`servings` must be between 1 and {MAX_SERVINGS}"
            )));
        }

        let request = RecipeRequest {
            ingredients,
            cuisine: args.cuisine.filter(|cuisine| !cuisine.trim().is_empty()),
            servings,
        };
        let recipe = self.generator.generate(request, &context.user).await.map_err(|error| {
            warn!(
                event_name = "tool.generate_custom_recipe.generator_failed",
                correlation_id = %context.request_id,
                error = %error,
                "recipe generator failed"
            );
            ToolError::Execution(format!("recipe generation failed: {error}"))
        })?;

        let names = recipe.ingredients.iter().map(|ingredient| ingredient.name.as_str()).collect::<Vec<_>>();
        let screen = context.user.allergen_screen();
        let (allergens, safety) = tokio::join!(
            self.safety.screen_ingredients(&names, &screen),
            self.safety.check_recipe_safety(
                &names,
                recipe.servings,
                context.user.measurement_system,
                context.user.language,
            ),
        );

        let mut custom = serde_json::to_value(&recipe)
            .map_err(|error| ToolError::Execution(error.to_string()))?;
        custom["allergen_conflicts"] = json!(allergens.conflicts);
        custom["allergen_verified"] = json!(allergens.verified);
        custom["safety"] = json!(safety);
        Ok(json!({ "customRecipe": custom }))
    }

    fn shape_result(&self, result: &Value) -> ShapedResult {
        ShapedResult::CustomRecipe(result.get("customRecipe").cloned().unwrap_or(Value::Null))
    }
}
