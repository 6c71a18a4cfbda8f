use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use souschef_core::domain::chat::{ChatMessage, ToolCall};
use souschef_core::domain::recipe::GeneratedRecipe;
use souschef_core::domain::user::UserContext;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Value>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
    /// Model that actually served the call, which may be a dated variant of
    /// the requested one.
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Provider adapter seam. Wire formats, retries and timeouts live behind it.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecipeRequest {
    pub ingredients: Vec<String>,
    pub cuisine: Option<String>,
    pub servings: u32,
}

/// Produces a recipe for one user. Failures are surfaced to the caller.
#[async_trait]
pub trait RecipeGenerator: Send + Sync {
    async fn generate(&self, request: RecipeRequest, user: &UserContext) -> Result<GeneratedRecipe>;
}
