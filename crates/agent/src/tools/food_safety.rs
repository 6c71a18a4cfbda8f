use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, ShapedResult, Tool, ToolContext, ToolError, ToolName};
use crate::safety::SafetyValidator;

const MAX_INGREDIENTS: usize = 40;
const DEFAULT_PORTIONS: u32 = 2;

#[derive(Debug, Deserialize)]
struct FoodSafetyArgs {
    ingredients: Vec<String>,
    #[serde(default)]
    portions: Option<u32>,
}

pub struct CheckFoodSafetyTool {
    safety: Arc<SafetyValidator>,
}

impl CheckFoodSafetyTool {
    pub fn new(safety: Arc<SafetyValidator>) -> Self {
        Self { safety }
    }
}

#[async_trait]
impl Tool for CheckFoodSafetyTool {
    fn name(&self) -> ToolName {
        ToolName::CheckFoodSafety
    }

    fn description(&self) -> &'static str {
        "Check safe cooking temperatures for a list of ingredients."
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
                "portions": {"type": "integer", "minimum": 1},
            },
            "required": ["ingredients"],
        })
    }

    fn allowed_in_voice(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, context: &ToolContext) -> Result<Value, ToolError> {
        let args = parse_args::<FoodSafetyArgs>(args)?;
        let ingredients = args
            .ingredients
            .iter()
            .map(|ingredient| ingredient.trim())
            .filter(|ingredient| !ingredient.is_empty())
            .collect::<Vec<_>>();
        if ingredients.is_empty() || ingredients.len() > MAX_INGREDIENTS {
            return Err(ToolError::invalid_arguments(format!(
                "`ingredients` must list between 1 and {MAX_INGREDIENTS} items"
            )));
        }
        let portions = args
            .portions
            .or(context.user.household_size)
            .unwrap_or(DEFAULT_PORTIONS)
            .max(1);

        let report = self
            .safety
            .check_recipe_safety(
                &ingredients,
                portions,
                context.user.measurement_system,
                context.user.language,
            )
            .await;

        serde_json::to_value(report).map_err(|error| ToolError::Execution(error.to_string()))
    }

    fn shape_result(&self, result: &Value) -> ShapedResult {
        ShapedResult::Result(result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{context, harness};
    use crate::tools::{ShapedResult, Surface};

    #[tokio::test]
    async fn reports_temperatures_for_the_users_units() {
        let harness = harness(None);
        let mut context = context(Surface::Voice, &[]);
        context.user.measurement_system = souschef_core::MeasurementSystem::Metric;

        let outcome = harness
            .registry
            .execute_tool("check_food_safety", r#"{"ingredients": ["pollo", "rice"]}"#, &context)
            .await
            .expect("safety check");

        let ShapedResult::Result(report) = outcome.shaped else {
            panic!("expected a plain result");
        };
        assert_eq!(report["safe"], false);
        assert!(report["warnings"][0].as_str().unwrap_or_default().contains("74°C"));
    }

    #[tokio::test]
    async fn unavailable_rules_still_answer_with_a_caveat() {
        let harness = harness(None);
        harness.reference.set_unavailable(true);

        let outcome = harness
            .registry
            .execute_tool("check_food_safety", r#"{"ingredients": ["ground beef"]}"#, &context(Surface::Text, &[]))
            .await
            .expect("never fails on data errors");

        assert_eq!(outcome.raw["verified"], false);
        assert_eq!(outcome.raw["safe"], false);
    }

    #[tokio::test]
    async fn blank_ingredient_lists_are_rejected() {
        let harness = harness(None);

        let error = harness
            .registry
            .execute_tool("check_food_safety", r#"{"ingredients": ["  "]}"#, &context(Surface::Text, &[]))
            .await
            .expect_err("blank list");

        assert!(error.is_client_error());
    }
}
