//! Domain model and shared policy for the souschef assistant core.
//!
//! Nothing in this crate performs I/O. Stores live in `souschef-db`, and the
//! request-scoped services that tie them together live in `souschef-agent`.

pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;
pub mod text;

pub use domain::chat::{ChatMessage, ToolCall};
pub use domain::reference::{AllergenEntry, FoodSafetyRule, IngredientAlias};
pub use domain::user::{HistoryMessage, Language, MeasurementSystem, UserContext};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use pricing::{estimate_cost, PRICING_TABLE_VERSION};
