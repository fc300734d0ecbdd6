//! Credential pool admin CRUD: `/admin/credentials/:provider_id`.
//!
//! Every mutation here also refreshes [`crate::repositories::StoreBackedCredentialSource`]'s
//! cache for that provider, since the credential pool manager only ever
//! reads from the cache.

use axum::extract::{Path, State};
use axum::Json;
use llmgate_core::{Credential, CredentialId, CredentialStatus, GatewayError, ProviderId};
use llmgate_store::CredentialStore;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCredentialRequest {
    pub id: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub emergency: bool,
    #[serde(default)]
    pub quota_limit: Option<u64>,
}

pub async fn list_for_provider(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> Result<Json<Vec<Credential>>, ServerError> {
    let provider_id = ProviderId::from(provider_id);
    Ok(Json(
        state
            .credentials
            .list_for_provider(&provider_id)
            .await
            .map_err(GatewayError::from)?,
    ))
}

pub async fn create(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    Json(body): Json<CreateCredentialRequest>,
) -> Result<Json<Credential>, ServerError> {
    let provider_id = ProviderId::from(provider_id);
    let credential = Credential {
        id: CredentialId::from(body.id),
        provider_id: provider_id.clone(),
        priority: body.priority,
        status: CredentialStatus::Active,
        emergency: body.emergency,
        quota_limit: body.quota_limit,
        quota_used: 0,
        last_used_at: None,
        cost_used: Decimal::ZERO,
        last_error_at: None,
    };
    state
        .credentials
        .upsert(credential.clone())
        .await
        .map_err(GatewayError::from)?;
    state
        .credential_source
        .refresh(&provider_id)
        .await
        .map_err(GatewayError::from)?;
    Ok(Json(credential))
}

pub async fn refresh(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let provider_id = ProviderId::from(provider_id);
    state
        .credential_source
        .refresh(&provider_id)
        .await
        .map_err(GatewayError::from)?;
    Ok(Json(serde_json::json!({ "refreshed": provider_id.to_string() })))
}
