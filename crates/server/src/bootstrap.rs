use std::sync::Arc;

use souschef_agent::guardrails::GuardrailPolicy;
use souschef_agent::llm::{LlmClient, RecipeGenerator};
use souschef_agent::runtime::{AgentRuntime, RuntimeServices, TurnError};
use souschef_agent::tools::{
    CheckFoodSafetyTool, GenerateCustomRecipeTool, GetResumableSessionTool, SearchRecipesTool,
    ToolRegistry,
};
use souschef_agent::{ContextBuilder, ReferenceData, SafetyValidator, SessionManager, UsageLogger};
use souschef_core::config::{AppConfig, ConfigError, LoadOptions};
use souschef_db::repositories::{
    RecipeRepository, SqlConversationRepository, SqlCookingSessionRepository,
    SqlProfileRepository, SqlRecipeRepository, SqlReferenceRepository, SqlSessionRepository,
    SqlUsageRepository,
};
use souschef_db::{connect_from_config, migrations, DbPool};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub reference: Arc<ReferenceData>,
    pub services: AgentServices,
}

/// Store-backed services shared by every runtime built from this process.
#[derive(Clone)]
pub struct AgentServices {
    pub safety: Arc<SafetyValidator>,
    pub context_builder: Arc<ContextBuilder>,
    pub sessions: SessionManager,
    pub usage: UsageLogger,
    pub recipes: Arc<dyn RecipeRepository>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let reference = Arc::new(ReferenceData::new(Arc::new(SqlReferenceRepository::new(db_pool.clone()))));
    let stats = reference.warm().await;
    if reference.is_warm() {
        info!(
            event_name = "system.bootstrap.reference_warmed",
            correlation_id = "bootstrap",
            aliases = stats.aliases,
            allergen_categories = stats.allergen_categories,
            "reference caches warmed"
        );
    } else {
        warn!(
            event_name = "system.bootstrap.reference_cold",
            correlation_id = "bootstrap",
            "reference data could not be loaded; caches will retry on first use"
        );
    }

    let conversations = Arc::new(SqlConversationRepository::new(db_pool.clone()));
    let services = AgentServices {
        safety: Arc::new(SafetyValidator::new(reference.clone())),
        context_builder: Arc::new(ContextBuilder::new(
            Arc::new(SqlProfileRepository::new(db_pool.clone())),
            conversations.clone(),
            Arc::new(SqlCookingSessionRepository::new(db_pool.clone())),
            config.agent.clone(),
        )),
        sessions: SessionManager::new(
            Arc::new(SqlSessionRepository::new(db_pool.clone())),
            conversations,
        ),
        usage: UsageLogger::new(Arc::new(SqlUsageRepository::new(db_pool.clone()))),
        recipes: Arc::new(SqlRecipeRepository::new(db_pool.clone())),
    };

    Ok(Application { config, db_pool, reference, services })
}

impl Application {
    /// Wires a runtime around a model provider. Provider adapters are
    /// supplied by the embedding surface.
    pub fn agent_runtime(
        &self,
        llm: Arc<dyn LlmClient>,
        generator: Arc<dyn RecipeGenerator>,
    ) -> Result<AgentRuntime, TurnError> {
        let services = &self.services;
        let mut tools = ToolRegistry::default();
        tools.register(SearchRecipesTool::new(services.recipes.clone(), services.safety.clone()));
        tools.register(GenerateCustomRecipeTool::new(generator, services.safety.clone()));
        tools.register(CheckFoodSafetyTool::new(services.safety.clone()));
        tools.register(GetResumableSessionTool::new(services.context_builder.clone()));

        AgentRuntime::new(RuntimeServices {
            llm,
            tools: Arc::new(tools),
            context_builder: services.context_builder.clone(),
            sessions: services.sessions.clone(),
            usage: services.usage.clone(),
            guardrails: GuardrailPolicy::default(),
            model: self.config.llm.model.clone(),
            settings: self.config.agent.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;
    use async_trait::async_trait;
    use souschef_agent::llm::{
        Completion, CompletionRequest, LlmClient, RecipeGenerator, RecipeRequest, TokenUsage,
    };
    use souschef_agent::tools::ShapedResult;
    use souschef_agent::{Surface, TurnRequest};
    use souschef_core::config::{ConfigOverrides, LoadOptions};
    use souschef_core::domain::chat::ToolCall;
    use souschef_core::domain::recipe::GeneratedRecipe;
    use souschef_core::domain::user::UserContext;

    use crate::bootstrap::{bootstrap, BootstrapError};

    struct ScriptedLlm {
        replies: Mutex<VecDeque<Completion>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _request: CompletionRequest) -> anyhow::Result<Completion> {
            self.replies.lock().expect("lock").pop_front().ok_or_else(|| anyhow!("script exhausted"))
        }
    }

    struct NoGenerator;

    #[async_trait]
    impl RecipeGenerator for NoGenerator {
        async fn generate(
            &self,
            _request: RecipeRequest,
            _user: &UserContext,
        ) -> anyhow::Result<GeneratedRecipe> {
            Err(anyhow!("no generator configured"))
        }
    }

    fn options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_rejects_non_sqlite_database_urls() {
        let result = bootstrap(options("postgres://localhost/souschef")).await;

        let message = match result {
            Err(BootstrapError::Config(error)) => error.to_string(),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("bootstrap should fail"),
        };
        assert!(message.contains("database.url"));
    }

    #[tokio::test]
    async fn bootstrap_warms_reference_data_from_the_seed() {
        let app = bootstrap(options("sqlite::memory:")).await.expect("bootstrap");

        assert!(app.reference.is_warm());
        let aliases = app.reference.aliases().await;
        assert_eq!(aliases.get("carne molida").map(String::as_str), Some("ground_beef"));
        assert!(app.reference.allergens().await.contains_key("dairy"));

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn integration_smoke_runs_a_tool_turn_against_sqlite() {
        let app = bootstrap(options("sqlite::memory:")).await.expect("bootstrap");
        let llm = Arc::new(ScriptedLlm {
            replies: Mutex::new(VecDeque::from([
                Completion {
                    tool_calls: vec![ToolCall {
                        id: "call-1".to_string(),
                        name: "check_food_safety".to_string(),
                        arguments: r#"{"ingredients": ["carne molida", "tortillas"]}"#.to_string(),
                    }],
                    usage: TokenUsage { input_tokens: 300, output_tokens: 25 },
                    model: "llama3.1".to_string(),
                    ..Completion::default()
                },
                Completion {
                    content: Some("Cook the beef all the way through.".to_string()),
                    usage: TokenUsage { input_tokens: 350, output_tokens: 40 },
                    model: "llama3.1".to_string(),
                    ..Completion::default()
                },
            ])),
        });
        let runtime = app.agent_runtime(llm, Arc::new(NoGenerator)).expect("runtime");

        let response = runtime
            .handle_turn(TurnRequest {
                request_id: "req-smoke".to_string(),
                user_id: "user-smoke".to_string(),
                session_id: None,
                message: "How long do I cook carne molida?".to_string(),
                surface: Surface::Text,
            })
            .await
            .expect("turn");

        let Some(ShapedResult::Result(report)) = response.results.first() else {
            panic!("expected a food safety report");
        };
        assert_eq!(report["verified"], true);
        assert!(report["warnings"][0].as_str().unwrap_or_default().contains("160°F"));

        let (messages,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM conversation_messages WHERE session_id = ?",
        )
        .bind(&response.session_id)
        .fetch_one(&app.db_pool)
        .await
        .expect("message count");
        assert_eq!(messages, 2);

        let (usage_rows,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM usage_logs WHERE request_id = 'req-smoke'")
                .fetch_one(&app.db_pool)
                .await
                .expect("usage count");
        assert_eq!(usage_rows, 2);

        app.db_pool.close().await;
    }
}
