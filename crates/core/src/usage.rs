use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{AgentId, CredentialId, ModelId, ProviderId, TenantId};

/// A single, append-only record of one completion call's token usage and
/// derived cost. Usage records are never updated or deleted after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub agent_id: AgentId,
    pub provider_id: ProviderId,
    pub credential_id: Option<CredentialId>,
    pub model_id: ModelId,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// `input_tokens + output_tokens`, computed once at construction so
    /// every downstream consumer agrees on the total without re-summing.
    pub total_tokens: u64,
    /// Cost for this call, rounded to 8 fractional digits.
    pub cost: Decimal,
    pub succeeded: bool,
    pub latency_ms: u64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Build a usage record, deriving `total_tokens` and rounding `cost` to
    /// 8 fractional digits as required by the data model.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        agent_id: AgentId,
        provider_id: ProviderId,
        credential_id: Option<CredentialId>,
        model_id: ModelId,
        input_tokens: u64,
        output_tokens: u64,
        cost: Decimal,
        succeeded: bool,
        latency_ms: u64,
        error_message: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            agent_id,
            provider_id,
            credential_id,
            model_id,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            cost: cost.round_dp(8),
            succeeded,
            latency_ms,
            error_message,
            created_at,
        }
    }
}

/// Rough token-count heuristic used when a provider does not return an
/// authoritative token count: `ceil(char_count / 4)`. A deliberate
/// approximation, not a tokenizer.
#[must_use]
pub fn estimate_tokens(text: &str, chars_per_token: u32) -> u64 {
    let chars_per_token = chars_per_token.max(1) as u64;
    let len = text.chars().count() as u64;
    len.div_ceil(chars_per_token)
}
