//! Usage alert listing and acknowledgement: `/admin/alerts`.

use axum::extract::{Path, Query as QueryParams, State};
use axum::Json;
use llmgate_core::{GatewayError, TenantId, UsageAlert};
use llmgate_store::{AlertStore, Query};
use serde::Deserialize;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListAlertsParams {
    pub tenant_id: String,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

pub async fn list(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListAlertsParams>,
) -> Result<Json<Vec<UsageAlert>>, ServerError> {
    let page = state
        .alerts
        .query(&Query {
            tenant_id: Some(TenantId::from(params.tenant_id)),
            limit: params.limit,
            offset: params.offset,
            ..Default::default()
        })
        .await
        .map_err(GatewayError::from)?;
    Ok(Json(page.records))
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeAlertParams {
    pub tenant_id: String,
}

pub async fn acknowledge(
    State(state): State<AppState>,
    Path(alert_id): Path<uuid::Uuid>,
    QueryParams(params): QueryParams<AcknowledgeAlertParams>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let acknowledged = state
        .alerts
        .acknowledge(&TenantId::from(params.tenant_id), alert_id)
        .await
        .map_err(GatewayError::from)?;
    if !acknowledged {
        return Err(ServerError::NotFound(format!("alert {alert_id} not found")));
    }
    Ok(Json(serde_json::json!({ "acknowledged": true })))
}
