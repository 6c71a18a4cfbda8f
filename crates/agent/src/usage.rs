use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use souschef_core::domain::usage::{CallPhase, UsageLogRow, UsageStatus};
use souschef_core::pricing::{estimate_cost, PRICING_TABLE_VERSION};
use souschef_db::repositories::UsageRepository;

/// Metadata keys that may reach the usage table. Anything else is dropped.
pub const METADATA_ALLOW_LIST: [&str; 5] = ["surface", "tool_name", "language", "round", "finish_reason"];
const USAGE_TYPE_TOKENS: &str = "tokens";

#[derive(Clone, Debug, PartialEq)]
pub struct UsageEvent {
    pub user_id: String,
    pub session_id: Option<String>,
    pub request_id: String,
    pub phase: CallPhase,
    pub attempt: u32,
    pub status: UsageStatus,
    pub function_name: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration: Duration,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct UsageLogger {
    repository: Arc<dyn UsageRepository>,
}

impl UsageLogger {
    pub fn new(repository: Arc<dyn UsageRepository>) -> Self {
        Self { repository }
    }

    /// Best effort: failures are logged and swallowed.
    pub async fn log_usage(&self, event: UsageEvent) {
        let row = build_row(event);
        let request_id = row.request_id.clone();
        let call_phase = row.call_phase.clone();

        match self.repository.upsert_usage(row).await {
            Ok(true) => {}
            Ok(false) => debug!(
                event_name = "usage.log.duplicate",
                request_id = %request_id,
                call_phase = %call_phase,
                "usage row already recorded; ignoring duplicate"
            ),
            Err(error) => warn!(
                event_name = "usage.log.write_failed",
                request_id = %request_id,
                call_phase = %call_phase,
                error = %error,
                "usage row could not be written"
            ),
        }
    }
}

pub(crate) fn build_row(event: UsageEvent) -> UsageLogRow {
    let estimated_cost_usd = estimate_cost(&event.model, event.input_tokens, event.output_tokens);
    let metadata = event
        .metadata
        .into_iter()
        .filter(|(key, _)| METADATA_ALLOW_LIST.contains(&key.as_str()))
        .collect();

    UsageLogRow {
        user_id: event.user_id,
        session_id: event.session_id,
        request_id: event.request_id,
        call_phase: event.phase.as_key(),
        attempt: event.attempt.max(1),
        status: event.status,
        function_name: event.function_name,
        usage_type: USAGE_TYPE_TOKENS.to_string(),
        model: event.model,
        input_tokens: event.input_tokens,
        output_tokens: event.output_tokens,
        estimated_cost_usd,
        pricing_version: PRICING_TABLE_VERSION.to_string(),
        duration_ms: u64::try_from(event.duration.as_millis()).unwrap_or(u64::MAX),
        metadata,
        created_at: Utc::now(),
    }
}
