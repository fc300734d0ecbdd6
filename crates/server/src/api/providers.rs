//! Provider catalog admin CRUD: `/admin/providers`.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use llmgate_core::{CostRates, GatewayError, Provider, ProviderId, ProviderStatus, ProviderType};
use llmgate_store::ProviderStore;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProviderRequest {
    pub id: String,
    pub name: String,
    pub provider_type: ProviderType,
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
    #[serde(default = "default_concurrency")]
    pub max_concurrency: u32,
    #[serde(default)]
    pub input_cost_per_1k_tokens: Decimal,
    #[serde(default)]
    pub output_cost_per_1k_tokens: Decimal,
    #[serde(default)]
    pub models: Vec<String>,
}

fn default_rate_limit() -> u32 {
    60
}

fn default_concurrency() -> u32 {
    5
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Provider>>, ServerError> {
    Ok(Json(state.providers.list().await.map_err(GatewayError::from)?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateProviderRequest>,
) -> Result<Json<Provider>, ServerError> {
    let provider = Provider {
        id: ProviderId::from(body.id),
        name: body.name,
        provider_type: body.provider_type,
        priority: body.priority,
        status: ProviderStatus::Active,
        rate_limit_per_minute: body.rate_limit_per_minute,
        max_concurrency: body.max_concurrency,
        cost_rates: CostRates {
            input_cost_per_1k_tokens: body.input_cost_per_1k_tokens,
            output_cost_per_1k_tokens: body.output_cost_per_1k_tokens,
        },
        models: body.models,
        updated_at: Utc::now(),
    };
    state
        .providers
        .upsert(provider.clone())
        .await
        .map_err(GatewayError::from)?;
    Ok(Json(provider))
}
