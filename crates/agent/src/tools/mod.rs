//! Tool registry shared by the text and voice surfaces.
//!
//! Every tool the model may call is registered here exactly once, with its
//! schema, voice eligibility, executor and result shaper. Both surfaces read
//! schemas from the same registration, so a voice-eligible tool is
//! byte-identical wherever it is offered.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use souschef_core::domain::user::UserContext;
use souschef_core::errors::{ApplicationError, DomainError};

pub mod custom_recipe;
pub mod food_safety;
pub mod resumable;
pub mod search;

pub use custom_recipe::GenerateCustomRecipeTool;
pub use food_safety::CheckFoodSafetyTool;
pub use resumable::GetResumableSessionTool;
pub use search::SearchRecipesTool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    SearchRecipes,
    GenerateCustomRecipe,
    CheckFoodSafety,
    GetResumableSession,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        Self::SearchRecipes,
        Self::GenerateCustomRecipe,
        Self::CheckFoodSafety,
        Self::GetResumableSession,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchRecipes => "search_recipes",
            Self::GenerateCustomRecipe => "generate_custom_recipe",
            Self::CheckFoodSafety => "check_food_safety",
            Self::GetResumableSession => "get_resumable_session",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.as_str() == value.trim())
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    #[default]
    Text,
    Voice,
}

impl Surface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
        }
    }
}

/// Request-scoped input handed to every executor.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub request_id: String,
    pub surface: Surface,
    pub user: UserContext,
}

#[derive(Debug, Error)]
pub enum ToolError {
    /// Malformed JSON, unknown tool or out-of-range arguments. Client error,
    /// never retried.
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("tool execution failed: {0}")]
    Execution(String),
}

impl ToolError {
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::Validation(DomainError::InvalidArguments(message.into()))
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<ToolError> for ApplicationError {
    fn from(error: ToolError) -> Self {
        match error {
            ToolError::Validation(error) => ApplicationError::Domain(error),
            ToolError::Execution(message) => ApplicationError::Integration(message),
        }
    }
}

/// The few shapes every surface knows how to render.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ShapedResult {
    Recipes(Vec<Value>),
    CustomRecipe(Value),
    Result(Value),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;
    fn description(&self) -> &'static str;
    /// JSON Schema for the arguments object.
    fn parameters(&self) -> Value;
    fn allowed_in_voice(&self) -> bool;
    async fn execute(&self, args: Value, context: &ToolContext) -> Result<Value, ToolError>;
    fn shape_result(&self, result: &Value) -> ShapedResult;

    fn schema(&self) -> Value {
        serde_json::json!({
            "name": self.name().as_str(),
            "description": self.description(),
            "parameters": self.parameters(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolOutcome {
    pub tool: ToolName,
    pub raw: Value,
    pub shaped: ShapedResult,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolName, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name(), Arc::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get_tool_registration(&self, name: &str) -> Option<Arc<dyn Tool>> {
        ToolName::parse(name).and_then(|name| self.tools.get(&name).cloned())
    }

    pub fn registered_schemas(&self) -> Vec<Value> {
        self.tools.values().map(|tool| tool.schema()).collect()
    }

    pub fn voice_eligible_names(&self) -> Vec<&'static str> {
        self.tools
            .values()
            .filter(|tool| tool.allowed_in_voice())
            .map(|tool| tool.name().as_str())
            .collect()
    }

    pub fn schemas_for(&self, surface: Surface) -> Vec<Value> {
        self.tools
            .values()
            .filter(|tool| surface == Surface::Text || tool.allowed_in_voice())
            .map(|tool| tool.schema())
            .collect()
    }

    /// Parses, validates and runs one tool call. Tools not offered on the
    /// caller's surface are treated as unknown.
    pub async fn execute_tool(
        &self,
        name: &str,
        raw_args: &str,
        context: &ToolContext,
    ) -> Result<ToolOutcome, ToolError> {
        let tool = self
            .get_tool_registration(name)
            .filter(|tool| context.surface == Surface::Text || tool.allowed_in_voice())
            .ok_or_else(|| DomainError::UnknownTool(name.to_string()))?;

        let args = if raw_args.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str::<Value>(raw_args).map_err(|error| {
                ToolError::invalid_arguments(format!("arguments are not valid JSON: {error}"))
            })?
        };
        if !args.is_object() {
            return Err(ToolError::invalid_arguments("arguments must be a JSON object"));
        }

        let raw = tool.execute(args, context).await?;
        let shaped = tool.shape_result(&raw);
        Ok(ToolOutcome { tool: tool.name(), raw, shaped })
    }
}

pub(crate) fn parse_args<T>(args: Value) -> Result<T, ToolError>
where
    T: DeserializeOwned,
{
    serde_json::from_value(args).map_err(|error| ToolError::invalid_arguments(error.to_string()))
}
