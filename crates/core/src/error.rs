use thiserror::Error;

use crate::ids::{BotId, CredentialId, ProviderId, TenantId};

/// Errors surfaced by the gateway and its component services.
///
/// Variants are grouped by the taxonomy: input errors (caller's fault),
/// quota errors (tenant/agent/provider over budget), availability errors (no
/// healthy provider to serve the request), and upstream errors split into
/// transient (worth a fallback/retry) and permanent (not worth retrying).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request payload failed validation before dispatch.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The named tenant does not exist.
    #[error("unknown tenant: {0}")]
    UnknownTenant(TenantId),

    /// The tenant has been suspended by an operator.
    #[error("tenant {0} is suspended")]
    TenantSuspended(TenantId),

    /// The requesting agent is not on the tenant's allowlist.
    #[error("agent {agent} is not allowed for tenant {tenant}")]
    AgentNotAllowed { tenant: TenantId, agent: String },

    /// A rate limit window was exhausted.
    #[error("rate limit exceeded for {scope}: {limit_kind}")]
    RateLimitExceeded { scope: String, limit_kind: String },

    /// A budget (daily or monthly) was exhausted.
    #[error("budget exceeded for tenant {0}")]
    BudgetExceeded(TenantId),

    /// No provider was available to serve the request (all disabled, open,
    /// or otherwise unhealthy).
    #[error("no available provider for tenant {0}")]
    NoAvailableProvider(TenantId),

    /// The named provider does not exist in the registry.
    #[error("unknown provider: {0}")]
    UnknownProvider(ProviderId),

    /// The named provider's circuit is open and rejecting calls.
    #[error("circuit open for provider {0}")]
    CircuitOpen(ProviderId),

    /// No usable credential was found in a provider's credential pool.
    #[error("no usable credential for provider {0}")]
    NoUsableCredential(ProviderId),

    /// A specific credential lookup failed.
    #[error("unknown credential: {0}")]
    UnknownCredential(CredentialId),

    /// The upstream provider call failed in a way that is safe to retry or
    /// fall back from (timeout, connection reset, 5xx, 429).
    #[error("transient upstream error from provider {provider}: {message}")]
    TransientUpstream { provider: ProviderId, message: String },

    /// The upstream provider call failed in a way that retrying will not
    /// fix (4xx other than 429, malformed response, auth rejected).
    #[error("permanent upstream error from provider {provider}: {message}")]
    PermanentUpstream { provider: ProviderId, message: String },

    /// A bot referenced by id does not exist.
    #[error("unknown bot: {0}")]
    UnknownBot(BotId),

    /// Failed to render a notification template.
    #[error("template render error: {0}")]
    TemplateRender(String),

    /// Failed to deliver a notification through a channel.
    #[error("notification delivery failed on channel {channel}: {message}")]
    NotificationDelivery { channel: String, message: String },

    /// An error occurred in the underlying state store.
    #[error("state error: {0}")]
    State(String),

    /// Failed to acquire a distributed lock within the allotted time.
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),

    /// The service was misconfigured (missing config, invalid cron, etc.).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Whether this error represents a transient condition worth falling
    /// back to another provider or retrying, as opposed to a permanent
    /// failure or a caller-side problem.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::TransientUpstream { .. } | GatewayError::CircuitOpen(_)
        )
    }
}
