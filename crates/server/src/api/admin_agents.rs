//! Read-only listings for bots and admin agents: `/admin/bots`, `/admin/agents`.

use axum::extract::State;
use axum::Json;
use llmgate_core::{AdminAgent, Bot, GatewayError};
use llmgate_store::{AdminAgentStore, BotStore, TenantStore};

use crate::error::ServerError;
use crate::state::AppState;

pub async fn list_bots(State(state): State<AppState>) -> Result<Json<Vec<Bot>>, ServerError> {
    let mut bots = Vec::new();
    for tenant in state.tenants.list().await.map_err(GatewayError::from)? {
        bots.extend(state.bots.list_for_tenant(&tenant.id).await.map_err(GatewayError::from)?);
    }
    Ok(Json(bots))
}

pub async fn list_agents(State(state): State<AppState>) -> Result<Json<Vec<AdminAgent>>, ServerError> {
    Ok(Json(state.admin_agents.list_all().await.map_err(GatewayError::from)?))
}
