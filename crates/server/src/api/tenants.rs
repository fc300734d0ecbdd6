//! Tenant admin CRUD: `/admin/tenants`.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use llmgate_core::{Tenant, TenantAlertThresholds, TenantId, TenantLimits};
use llmgate_store::TenantStore;
use serde::Deserialize;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub id: String,
    pub name: String,
    pub monthly_budget: rust_decimal::Decimal,
    #[serde(default)]
    pub daily_budget: Option<rust_decimal::Decimal>,
    #[serde(default)]
    pub suspend_on_exceed: bool,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Tenant>>, ServerError> {
    Ok(Json(state.tenants.list().await.map_err(llmgate_core::GatewayError::from)?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Tenant>, ServerError> {
    let tenant_id = TenantId::from(id);
    let tenant = state
        .tenants
        .get(&tenant_id)
        .await
        .map_err(llmgate_core::GatewayError::from)?
        .ok_or_else(|| ServerError::NotFound(format!("tenant {tenant_id} not found")))?;
    Ok(Json(tenant))
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateTenantRequest>,
) -> Result<Json<Tenant>, ServerError> {
    let tenant = Tenant {
        id: TenantId::from(body.id),
        name: body.name,
        monthly_budget: body.monthly_budget,
        daily_budget: body.daily_budget,
        limits: TenantLimits::default(),
        allowed_agents: Vec::new(),
        allowed_providers: Vec::new(),
        suspended: false,
        suspend_on_exceed: body.suspend_on_exceed,
        deleted: false,
        alert_thresholds: TenantAlertThresholds::default(),
        created_at: Utc::now(),
    };
    state
        .tenants
        .upsert(tenant.clone())
        .await
        .map_err(llmgate_core::GatewayError::from)?;
    Ok(Json(tenant))
}

async fn set_suspended(state: &AppState, id: String, suspended: bool) -> Result<Tenant, ServerError> {
    let tenant_id = TenantId::from(id);
    let mut tenant = state
        .tenants
        .get(&tenant_id)
        .await
        .map_err(llmgate_core::GatewayError::from)?
        .ok_or_else(|| ServerError::NotFound(format!("tenant {tenant_id} not found")))?;
    tenant.suspended = suspended;
    state
        .tenants
        .upsert(tenant.clone())
        .await
        .map_err(llmgate_core::GatewayError::from)?;
    Ok(tenant)
}

pub async fn suspend(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Tenant>, ServerError> {
    Ok(Json(set_suspended(&state, id, true).await?))
}

pub async fn resume(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Tenant>, ServerError> {
    Ok(Json(set_suspended(&state, id, false).await?))
}
