//! Agent runtime for the souschef assistant.
//!
//! This crate owns everything that happens between "a user said something"
//! and "here is a checked reply":
//! - Reference data caching and ingredient normalization (`reference`, `normalizer`)
//! - Allergen and food-safety validation (`safety`)
//! - Per-request user context assembly (`context`)
//! - Transcript compaction before every model call (`conversation`)
//! - The tool registry shared by the text and voice surfaces (`tools`)
//! - Session bookkeeping and usage accounting (`session`, `usage`)
//! - The per-turn loop that ties them together (`runtime`, `prompt`, `guardrails`)
//!
//! # Safety Principle
//!
//! The model chooses which tool to call and phrases the reply. It NEVER
//! decides whether an ingredient is safe for a user. Allergen screening and
//! cooking temperatures come from reference data and are enforced again by
//! `guardrails` before a result reaches the user.

pub mod context;
pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod normalizer;
pub mod prompt;
pub mod reference;
pub mod runtime;
pub mod safety;
pub mod session;
pub mod tools;
pub mod usage;

pub use context::ContextBuilder;
pub use conversation::normalize_for_model;
pub use normalizer::IngredientNormalizer;
pub use reference::{ReferenceCache, ReferenceData};
pub use guardrails::{GuardrailDecision, GuardrailPolicy};
pub use prompt::PromptRenderer;
pub use runtime::{AgentRuntime, RuntimeServices, Surface, TurnError, TurnRequest, TurnResponse};
pub use safety::SafetyValidator;
pub use session::{EnsuredSession, SessionError, SessionManager};
pub use tools::{ToolContext, ToolError, ToolRegistry};
pub use usage::{UsageEvent, UsageLogger};
