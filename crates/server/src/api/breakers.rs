//! Circuit breaker admin endpoints: `/admin/breakers`. Grounded on the
//! teacher's `circuit_breakers.rs` (list/trip/reset handler shape).

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CircuitBreakerStatus {
    pub provider: String,
    pub state: String,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout_seconds: u64,
    pub half_open_timeout_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct ListBreakersResponse {
    pub circuit_breakers: Vec<CircuitBreakerStatus>,
}

#[derive(Debug, Serialize)]
pub struct BreakerActionResponse {
    pub provider: String,
    pub state: String,
    pub message: String,
}

async fn status_of(registry: &llmgate_breaker::CircuitBreakerRegistry, provider: &llmgate_core::ProviderId) -> Option<CircuitBreakerStatus> {
    let breaker = registry.get(provider)?;
    let config = breaker.config();
    Some(CircuitBreakerStatus {
        provider: provider.to_string(),
        state: breaker.state().await.to_string(),
        failure_threshold: config.failure_threshold,
        success_threshold: config.success_threshold,
        open_timeout_seconds: config.open_timeout.as_secs(),
        half_open_timeout_seconds: config.half_open_timeout.as_secs(),
    })
}

pub async fn list(State(state): State<AppState>) -> Json<ListBreakersResponse> {
    let mut circuit_breakers = Vec::new();
    for provider in state.breakers.providers() {
        if let Some(status) = status_of(&state.breakers, provider).await {
            circuit_breakers.push(status);
        }
    }
    Json(ListBreakersResponse { circuit_breakers })
}

pub async fn trip(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> Result<Json<BreakerActionResponse>, ServerError> {
    let provider_id = llmgate_core::ProviderId::from(provider_id);
    let Some(breaker) = state.breakers.get(&provider_id) else {
        return Err(ServerError::NotFound(format!("no breaker for provider {provider_id}")));
    };
    breaker.trip().await;
    Ok(Json(BreakerActionResponse {
        provider: provider_id.to_string(),
        state: breaker.state().await.to_string(),
        message: "circuit tripped".to_string(),
    }))
}

pub async fn reset(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> Result<Json<BreakerActionResponse>, ServerError> {
    let provider_id = llmgate_core::ProviderId::from(provider_id);
    let Some(breaker) = state.breakers.get(&provider_id) else {
        return Err(ServerError::NotFound(format!("no breaker for provider {provider_id}")));
    };
    breaker.reset().await;
    Ok(Json(BreakerActionResponse {
        provider: provider_id.to_string(),
        state: breaker.state().await.to_string(),
        message: "circuit reset".to_string(),
    }))
}
