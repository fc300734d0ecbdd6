//! `POST /v1/complete` — the completion API tenants and agents call.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use llmgate_core::{AgentId, TenantId};
use llmgate_gateway::{CompletionRequest, CompletionResponse, Message};
use serde::Deserialize;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CompleteRequestBody {
    pub tenant_id: String,
    pub agent_id: String,
    pub messages: Vec<MessageBody>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prefer_provider: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub role: String,
    pub content: String,
}

pub async fn complete(
    State(state): State<AppState>,
    Json(body): Json<CompleteRequestBody>,
) -> Result<Json<CompletionResponse>, ServerError> {
    let mut request = CompletionRequest::new(
        TenantId::from(body.tenant_id),
        AgentId::from(body.agent_id),
        body.messages
            .into_iter()
            .map(|m| Message {
                role: m.role,
                content: m.content,
            })
            .collect(),
    );
    request.model = body.model;
    request.prefer_provider = body.prefer_provider.map(Into::into);
    request.max_tokens = body.max_tokens;
    request.temperature = body.temperature;
    request.channel = body.channel;
    request.group_id = body.group_id;
    request.session_id = body.session_id;
    request.metadata = body.metadata;
    if let Some(seconds) = body.timeout_seconds {
        request.timeout = Duration::from_secs(seconds);
    }

    let response = state.gateway.complete(request).await?;
    Ok(Json(response))
}
