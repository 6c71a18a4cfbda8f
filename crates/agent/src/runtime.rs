use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use souschef_core::config::AgentConfig;
use souschef_core::domain::chat::{ChatMessage, ToolCall};
use souschef_core::domain::usage::{CallPhase, UsageStatus};
use souschef_core::domain::user::{HistoryRole, UserContext};
use souschef_core::errors::ApplicationError;
use souschef_core::text::sanitize_message;

use crate::context::ContextBuilder;
use crate::conversation::normalize_for_model;
use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::{Completion, CompletionRequest, LlmClient};
use crate::prompt::PromptRenderer;
use crate::session::{SessionError, SessionManager};
use crate::tools::{ShapedResult, ToolContext, ToolError, ToolRegistry};
use crate::usage::{UsageEvent, UsageLogger};

pub use crate::tools::Surface;

const TURN_FUNCTION_NAME: &str = "chat_turn";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnRequest {
    pub request_id: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub message: String,
    pub surface: Surface,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub session_created: bool,
    pub reply: String,
    pub results: Vec<ShapedResult>,
    pub caveats: Vec<String>,
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("model call failed: {0}")]
    Provider(String),
    #[error("system prompt could not be rendered: {0}")]
    Prompt(String),
}

impl TurnError {
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Session(SessionError::NotOwned) => true,
            Self::Tool(error) => error.is_client_error(),
            _ => false,
        }
    }
}

impl From<TurnError> for ApplicationError {
    fn from(error: TurnError) -> Self {
        match error {
            TurnError::Session(error) => error.into(),
            TurnError::Tool(error) => error.into(),
            TurnError::Provider(message) => ApplicationError::Integration(message),
            TurnError::Prompt(message) => ApplicationError::Configuration(message),
        }
    }
}

/// Everything one runtime needs. Shared services are cheap to clone.
pub struct RuntimeServices {
    pub llm: Arc<dyn LlmClient>,
    pub tools: Arc<ToolRegistry>,
    pub context_builder: Arc<ContextBuilder>,
    pub sessions: SessionManager,
    pub usage: UsageLogger,
    pub guardrails: GuardrailPolicy,
    pub model: String,
    pub settings: AgentConfig,
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    context_builder: Arc<ContextBuilder>,
    sessions: SessionManager,
    usage: UsageLogger,
    prompt: PromptRenderer,
    guardrails: GuardrailPolicy,
    model: String,
    settings: AgentConfig,
}

struct TurnState {
    transcript: Vec<ChatMessage>,
    results: Vec<ShapedResult>,
    caveats: Vec<String>,
    executed_calls: Vec<Value>,
}

impl AgentRuntime {
    pub fn new(services: RuntimeServices) -> Result<Self, TurnError> {
        let prompt = PromptRenderer::new().map_err(|error| TurnError::Prompt(error.to_string()))?;
        Ok(Self {
            llm: services.llm,
            tools: services.tools,
            context_builder: services.context_builder,
            sessions: services.sessions,
            usage: services.usage,
            prompt,
            guardrails: services.guardrails,
            model: services.model,
            settings: services.settings,
        })
    }

    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnResponse, TurnError> {
        let message = sanitize_message(&request.message, self.settings.max_message_chars);
        let session = self
            .sessions
            .ensure_session(&request.user_id, request.session_id.as_deref(), Some(&message))
            .await?;

        let (user, resumable) = tokio::join!(
            self.context_builder.build_context(&request.user_id, Some(&session.session_id)),
            self.context_builder.get_resumable_cooking_session(&request.user_id),
        );
        let system_prompt = self
            .prompt
            .render_system_prompt(&user, resumable.as_ref())
            .map_err(|error| TurnError::Prompt(error.to_string()))?;

        let mut state = TurnState {
            transcript: seed_transcript(system_prompt, &user, &message),
            results: Vec::new(),
            caveats: Vec::new(),
            executed_calls: Vec::new(),
        };
        let tool_context = ToolContext {
            request_id: request.request_id.clone(),
            surface: request.surface,
            user,
        };
        let schemas = self.tools.schemas_for(request.surface);

        let mut reply = String::new();
        for round in 0..=self.settings.max_tool_rounds {
            // The last round offers no tools so the model has to answer.
            let offer_tools = round < self.settings.max_tool_rounds;
            let completion = self
                .call_model(
                    &request,
                    &session.session_id,
                    &tool_context,
                    round,
                    CompletionRequest {
                        model: self.model.clone(),
                        messages: normalize_for_model(&state.transcript),
                        tools: if offer_tools { schemas.clone() } else { Vec::new() },
                    },
                )
                .await?;

            if !offer_tools || completion.tool_calls.is_empty() {
                reply = completion.content.unwrap_or_default();
                break;
            }

            state.transcript.push(ChatMessage::Assistant {
                content: completion.content.unwrap_or_default(),
                tool_calls: completion.tool_calls.clone(),
            });
            for call in &completion.tool_calls {
                self.dispatch(call, &tool_context, &mut state).await?;
            }
        }

        if !state.caveats.is_empty() {
            let caveats = state.caveats.join("\n");
            reply = if reply.trim().is_empty() { caveats } else { format!("{reply}\n\n{caveats}") };
        }

        self.persist(&session.session_id, &message, &reply, &state.executed_calls).await;

        info!(
            event_name = "turn.completed",
            correlation_id = %request.request_id,
            session_id = %session.session_id,
            surface = request.surface.as_str(),
            results = state.results.len(),
            caveats = state.caveats.len(),
            "turn completed"
        );

        Ok(TurnResponse {
            session_id: session.session_id,
            session_created: session.created,
            reply,
            results: state.results,
            caveats: state.caveats,
        })
    }

    async fn call_model(
        &self,
        request: &TurnRequest,
        session_id: &str,
        tool_context: &ToolContext,
        round: u32,
        completion_request: CompletionRequest,
    ) -> Result<Completion, TurnError> {
        let started = Instant::now();
        let result = self.llm.complete(completion_request).await;
        let elapsed = started.elapsed();

        let mut metadata = BTreeMap::from([
            ("surface".to_string(), request.surface.as_str().to_string()),
            ("language".to_string(), tool_context.user.language.as_str().to_string()),
            ("round".to_string(), round.to_string()),
        ]);
        let (status, model, usage) = match &result {
            Ok(completion) => {
                if let Some(reason) = &completion.finish_reason {
                    metadata.insert("finish_reason".to_string(), reason.clone());
                }
                if !completion.tool_calls.is_empty() {
                    let names = completion
                        .tool_calls
                        .iter()
                        .map(|call| call.name.as_str())
                        .collect::<Vec<_>>()
                        .join(",");
                    metadata.insert("tool_name".to_string(), names);
                }
                let model = if completion.model.is_empty() {
                    self.model.clone()
                } else {
                    completion.model.clone()
                };
                (UsageStatus::Success, model, completion.usage)
            }
            Err(_) => (UsageStatus::Error, self.model.clone(), Default::default()),
        };

        self.usage
            .log_usage(UsageEvent {
                user_id: request.user_id.clone(),
                session_id: Some(session_id.to_string()),
                request_id: request.request_id.clone(),
                phase: CallPhase::for_round(round),
                attempt: 1,
                status,
                function_name: TURN_FUNCTION_NAME.to_string(),
                model,
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                duration: elapsed,
                metadata,
            })
            .await;

        result.map_err(|error| {
            warn!(
                event_name = "turn.model.failed",
                correlation_id = %request.request_id,
                round,
                error = %error,
                "model call failed"
            );
            TurnError::Provider(error.to_string())
        })
    }

    async fn dispatch(
        &self,
        call: &ToolCall,
        tool_context: &ToolContext,
        state: &mut TurnState,
    ) -> Result<(), TurnError> {
        state.executed_calls.push(json!({"id": call.id, "name": call.name}));

        let outcome = match self.tools.execute_tool(&call.name, &call.arguments, tool_context).await {
            Ok(outcome) => outcome,
            Err(error) if error.is_client_error() => {
                warn!(
                    event_name = "turn.tool.rejected",
                    correlation_id = %tool_context.request_id,
                    tool_name = %call.name,
                    error = %error,
                    "tool call rejected"
                );
                return Err(error.into());
            }
            Err(error) => {
                warn!(
                    event_name = "turn.tool.failed",
                    correlation_id = %tool_context.request_id,
                    tool_name = %call.name,
                    error = %error,
                    "tool execution failed; reporting to model"
                );
                let content = json!({"error": "tool_unavailable", "message": error.to_string()});
                state.transcript.push(ChatMessage::tool(&call.id, content.to_string()));
                return Ok(());
            }
        };

        match self.guardrails.evaluate(&outcome, tool_context.user.language) {
            GuardrailDecision::Allow => {
                state.transcript.push(ChatMessage::tool(&call.id, shaped_content(&outcome.shaped)));
                state.results.push(outcome.shaped);
            }
            GuardrailDecision::Deny { reason_code, user_message, fallback_path } => {
                info!(
                    event_name = "turn.guardrail.deny",
                    correlation_id = %tool_context.request_id,
                    tool_name = outcome.tool.as_str(),
                    reason_code,
                    fallback_path,
                    "tool result withheld"
                );
                let content = json!({"withheld": true, "reason": reason_code, "next": fallback_path});
                state.transcript.push(ChatMessage::tool(&call.id, content.to_string()));
                push_caveat(&mut state.caveats, user_message);
            }
            GuardrailDecision::Degrade { reason_code, user_message, .. } => {
                info!(
                    event_name = "turn.guardrail.degrade",
                    correlation_id = %tool_context.request_id,
                    tool_name = outcome.tool.as_str(),
                    reason_code,
                    "tool result kept with caveat"
                );
                state.transcript.push(ChatMessage::tool(&call.id, shaped_content(&outcome.shaped)));
                state.results.push(outcome.shaped);
                push_caveat(&mut state.caveats, user_message);
            }
        }
        Ok(())
    }

    async fn persist(&self, session_id: &str, message: &str, reply: &str, executed_calls: &[Value]) {
        let tool_calls = (!executed_calls.is_empty()).then(|| Value::Array(executed_calls.to_vec()));
        let turns = [(HistoryRole::User, message, None), (HistoryRole::Assistant, reply, tool_calls)];

        for (role, content, tool_calls) in turns {
            if let Err(error) = self.sessions.persist_turn(session_id, role, content, tool_calls).await {
                warn!(
                    event_name = "turn.persist.failed",
                    session_id,
                    role = role.as_str(),
                    error = %error,
                    "turn could not be saved to history"
                );
            }
        }
    }
}

fn seed_transcript(system_prompt: String, user: &UserContext, message: &str) -> Vec<ChatMessage> {
    let mut transcript = Vec::with_capacity(user.history.len() + 2);
    transcript.push(ChatMessage::system(system_prompt));
    transcript.extend(user.history.iter().map(|entry| match entry.role {
        HistoryRole::User => ChatMessage::user(&entry.content),
        HistoryRole::Assistant => ChatMessage::assistant(&entry.content),
    }));
    transcript.push(ChatMessage::user(message));
    transcript
}

fn shaped_content(shaped: &ShapedResult) -> String {
    serde_json::to_string(shaped).unwrap_or_else(|_| "{}".to_string())
}

fn push_caveat(caveats: &mut Vec<String>, caveat: String) {
    if !caveats.contains(&caveat) {
        caveats.push(caveat);
    }
}
