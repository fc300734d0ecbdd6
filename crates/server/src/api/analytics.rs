//! Usage analytics rollups: `/admin/analytics/usage`.

use axum::extract::{Query as QueryParams, State};
use axum::Json;
use chrono::Utc;
use llmgate_analytics::Period;
use llmgate_core::TenantId;
use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AnalyticsParams {
    pub tenant_id: String,
    #[serde(default)]
    pub period: PeriodParam,
}

#[derive(Debug, Default, Deserialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PeriodParam {
    Day,
    Week,
    #[default]
    Month,
}

impl From<PeriodParam> for Period {
    fn from(value: PeriodParam) -> Self {
        match value {
            PeriodParam::Day => Period::Day,
            PeriodParam::Week => Period::Week,
            PeriodParam::Month => Period::Month,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub total_cost: rust_decimal::Decimal,
    pub total_tokens: u64,
    pub total_requests: u64,
    pub avg_latency_ms: f64,
    pub success_rate: f64,
    pub projected_month_end: Option<rust_decimal::Decimal>,
}

pub async fn usage(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<AnalyticsParams>,
) -> Result<Json<SummaryResponse>, ServerError> {
    let tenant_id = TenantId::from(params.tenant_id);
    let summary = state
        .analytics
        .summary(&tenant_id, params.period.into(), Utc::now())
        .await?;

    Ok(Json(SummaryResponse {
        total_cost: summary.total_cost,
        total_tokens: summary.total_tokens,
        total_requests: summary.total_requests,
        avg_latency_ms: summary.avg_latency_ms,
        success_rate: summary.success_rate,
        projected_month_end: summary.projected_month_end,
    }))
}
