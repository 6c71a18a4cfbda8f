use souschef_core::domain::usage::UsageLogRow;

use super::{format_timestamp, RepositoryError, UsageRepository};
use crate::DbPool;

pub struct SqlUsageRepository {
    pool: DbPool,
}

impl SqlUsageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UsageRepository for SqlUsageRepository {
    async fn upsert_usage(&self, row: UsageLogRow) -> Result<bool, RepositoryError> {
        let metadata = serde_json::to_string(&row.metadata)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let input_tokens = i64::try_from(row.input_tokens)
            .map_err(|error| RepositoryError::Decode(format!("input_tokens: {error}")))?;
        let output_tokens = i64::try_from(row.output_tokens)
            .map_err(|error| RepositoryError::Decode(format!("output_tokens: {error}")))?;
        let duration_ms = i64::try_from(row.duration_ms)
            .map_err(|error| RepositoryError::Decode(format!("duration_ms: {error}")))?;

        let result = sqlx::query(
            "INSERT INTO usage_logs
                (user_id, session_id, request_id, call_phase, attempt, status, function_name,
                 usage_type, model, input_tokens, output_tokens, estimated_cost_usd,
                 pricing_version, duration_ms, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(request_id, call_phase, attempt) DO NOTHING",
        )
        .bind(&row.user_id)
        .bind(&row.session_id)
        .bind(&row.request_id)
        .bind(&row.call_phase)
        .bind(row.attempt)
        .bind(row.status.as_str())
        .bind(&row.function_name)
        .bind(&row.usage_type)
        .bind(&row.model)
        .bind(input_tokens)
        .bind(output_tokens)
        .bind(row.estimated_cost_usd.map(|cost| cost.to_string()))
        .bind(&row.pricing_version)
        .bind(duration_ms)
        .bind(metadata)
        .bind(format_timestamp(row.created_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
