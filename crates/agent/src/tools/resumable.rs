use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ShapedResult, Tool, ToolContext, ToolError, ToolName};
use crate::context::ContextBuilder;

/// Text-only: voice sessions resume through the cooking surface itself.
pub struct GetResumableSessionTool {
    context_builder: Arc<ContextBuilder>,
}

impl GetResumableSessionTool {
    pub fn new(context_builder: Arc<ContextBuilder>) -> Self {
        Self { context_builder }
    }
}

#[async_trait]
impl Tool for GetResumableSessionTool {
    fn name(&self) -> ToolName {
        ToolName::GetResumableSession
    }

    fn description(&self) -> &'static str {
        "Find a cooking session the user started recently and can pick back up."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn allowed_in_voice(&self) -> bool {
        false
    }

    async fn execute(&self, _args: Value, context: &ToolContext) -> Result<Value, ToolError> {
        let session = self.context_builder.get_resumable_cooking_session(&context.user.user_id).await;
        Ok(session.and_then(|session| serde_json::to_value(session).ok()).unwrap_or(Value::Null))
    }

    fn shape_result(&self, result: &Value) -> ShapedResult {
        ShapedResult::Result(result.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use souschef_core::domain::session::{CookingSession, RecipeKind};

    use super::super::test_support::{context, harness};
    use crate::tools::{ShapedResult, Surface};

    #[tokio::test]
    async fn returns_the_fresh_in_progress_session() {
        let harness = harness(None);
        harness
            .cooking
            .insert(CookingSession {
                id: "cs-9".to_string(),
                user_id: "user-1".to_string(),
                recipe_id: "r-4".to_string(),
                recipe_kind: RecipeKind::Custom,
                recipe_name: "Chilaquiles".to_string(),
                current_step: 4,
                total_steps: 7,
                last_active_at: Utc::now() - Duration::hours(1),
                completed: false,
                abandoned: false,
            })
            .await;

        let outcome = harness
            .registry
            .execute_tool("get_resumable_session", "{}", &context(Surface::Text, &[]))
            .await
            .expect("lookup");

        let ShapedResult::Result(session) = outcome.shaped else {
            panic!("expected a plain result");
        };
        assert_eq!(session["session_id"], "cs-9");
        assert_eq!(session["current_step"], 4);
        assert_eq!(session["recipe_kind"], "custom");
    }
}
