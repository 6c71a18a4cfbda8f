use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which model invocation within a turn a usage row accounts for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    Initial,
    ToolFollowup { round: u32 },
}

impl CallPhase {
    pub fn for_round(round: u32) -> Self {
        if round == 0 {
            Self::Initial
        } else {
            Self::ToolFollowup { round }
        }
    }

    pub fn as_key(&self) -> String {
        match self {
            Self::Initial => "initial".to_string(),
            Self::ToolFollowup { round } => format!("tool_followup_{round}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Success,
    Error,
}

impl UsageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One persisted accounting row. `(request_id, call_phase, attempt)` is the
/// natural key; a second write with the same key is ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageLogRow {
    pub user_id: String,
    pub session_id: Option<String>,
    pub request_id: String,
    pub call_phase: String,
    pub attempt: u32,
    pub status: UsageStatus,
    pub function_name: String,
    pub usage_type: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost_usd: Option<Decimal>,
    pub pricing_version: String,
    pub duration_ms: u64,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl UsageLogRow {
    pub fn natural_key(&self) -> (String, String, u32) {
        (self.request_id.clone(), self.call_phase.clone(), self.attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::CallPhase;

    #[test]
    fn phase_keys_distinguish_followup_rounds() {
        assert_eq!(CallPhase::for_round(0).as_key(), "initial");
        assert_eq!(CallPhase::for_round(2).as_key(), "tool_followup_2");
        assert_ne!(CallPhase::for_round(1).as_key(), CallPhase::for_round(2).as_key());
    }
}
