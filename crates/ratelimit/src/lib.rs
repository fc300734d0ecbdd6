//! Rate limiter and quota engine.
//!
//! Counters are windowed to the current 60-second bucket using
//! epoch-aligned window indices (see [`llmgate_core::window`]) so every
//! gateway instance agrees on window boundaries without coordination.
//! Checks run in a fixed order — tenant, then agent, then provider — and
//! are side-effect free: [`RateLimiter::check`] never mutates counters, so
//! a caller can check a request, dispatch it, and only reserve afterward.
//! [`RateLimiter::reserve`] performs the increments (and acquires the
//! provider's concurrency slot) once a request is actually admitted.

use std::sync::Arc;
use std::time::Duration;

use llmgate_core::window::{day_key, minute_window_index};
use llmgate_core::{AgentId, GatewayError, Provider, ProviderId, Tenant, TenantLimits};
use llmgate_state::{KeyKind, StateKey, StateStore};
use tracing::warn;

/// Per-scope limits. `None` falls back to the scope's gateway-wide default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeLimits {
    pub requests_per_minute: Option<u32>,
    pub tokens_per_minute: Option<u64>,
    pub requests_per_day: Option<u32>,
    pub max_concurrency: Option<u32>,
}

/// Gateway-wide default limits per scope, used when a tenant/agent/provider
/// does not override them. Matches the data model's defaults: tenant 100
/// req/min + 100k tok/min + 5k req/day; agent 20 req/min + 50k tok/min;
/// provider 5 concurrency + 60 req/min.
#[derive(Debug, Clone)]
pub struct RateLimitDefaults {
    pub tenant: ScopeLimits,
    pub agent: ScopeLimits,
    pub provider: ScopeLimits,
}

impl Default for RateLimitDefaults {
    fn default() -> Self {
        Self {
            tenant: ScopeLimits {
                requests_per_minute: Some(100),
                tokens_per_minute: Some(100_000),
                requests_per_day: Some(5_000),
                max_concurrency: None,
            },
            agent: ScopeLimits {
                requests_per_minute: Some(20),
                tokens_per_minute: Some(50_000),
                requests_per_day: None,
                max_concurrency: None,
            },
            provider: ScopeLimits {
                requests_per_minute: Some(60),
                tokens_per_minute: None,
                requests_per_day: None,
                max_concurrency: Some(5),
            },
        }
    }
}

fn effective(tenant_override: Option<u32>, default: Option<u32>) -> Option<u32> {
    tenant_override.or(default)
}

/// A request's computed scope limits for one rate-limit decision.
struct ResolvedLimits {
    tenant: ScopeLimits,
    agent: ScopeLimits,
    provider: ScopeLimits,
}

fn tenant_limits(tenant: &Tenant, defaults: &RateLimitDefaults) -> ScopeLimits {
    let TenantLimits {
        requests_per_minute,
        tokens_per_minute,
        requests_per_day,
    } = tenant.limits.clone();
    ScopeLimits {
        requests_per_minute: effective(requests_per_minute, defaults.tenant.requests_per_minute),
        tokens_per_minute: tokens_per_minute.or(defaults.tenant.tokens_per_minute),
        requests_per_day: effective(requests_per_day, defaults.tenant.requests_per_day),
        max_concurrency: defaults.tenant.max_concurrency,
    }
}

fn resolve(tenant: &Tenant, defaults: &RateLimitDefaults, provider: &Provider) -> ResolvedLimits {
    ResolvedLimits {
        tenant: tenant_limits(tenant, defaults),
        agent: defaults.agent,
        provider: ScopeLimits {
            requests_per_minute: Some(provider.rate_limit_per_minute).or(defaults.provider.requests_per_minute),
            tokens_per_minute: defaults.provider.tokens_per_minute,
            requests_per_day: defaults.provider.requests_per_day,
            max_concurrency: Some(provider.max_concurrency).or(defaults.provider.max_concurrency),
        },
    }
}

fn minute_key(scope: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    format!("{scope}:minute:{}", minute_window_index(now))
}

fn day_counter_key(scope: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    format!("{scope}:day:{}", day_key(now))
}

fn concurrency_key(scope: &str) -> String {
    format!("{scope}:concurrency")
}

/// Rate limiter and quota engine over tenant/agent/provider scopes.
pub struct RateLimiter {
    state: Arc<dyn StateStore>,
    defaults: RateLimitDefaults,
}

/// A held provider concurrency slot. The caller must call
/// [`ConcurrencyPermit::release`] when the request finishes — including on
/// cancellation or failure — so in-flight accounting stays correct.
pub struct ConcurrencyPermit {
    state: Arc<dyn StateStore>,
    key: StateKey,
}

impl ConcurrencyPermit {
    pub async fn release(self) {
        if let Err(e) = self.state.increment(&self.key, -1, None).await {
            warn!(error = %e, "failed to release concurrency permit");
        }
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>, defaults: RateLimitDefaults) -> Self {
        Self { state, defaults }
    }

    async fn counter(&self, kind: KeyKind, id: &str) -> Result<i64, GatewayError> {
        let key = StateKey::global(kind, id);
        Ok(self
            .state
            .get(&key)
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0))
    }

    /// Check whether a request of `estimated_tokens` would be admitted,
    /// without mutating any counters. Evaluated tenant, then agent, then
    /// provider, in that order, so a caller always learns the first
    /// binding constraint.
    pub async fn check(
        &self,
        tenant: &Tenant,
        agent_id: &AgentId,
        provider: &Provider,
        estimated_tokens: u64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), GatewayError> {
        self.check_tenant_and_agent(tenant, agent_id, estimated_tokens, now).await?;

        let limits = resolve(tenant, &self.defaults, provider);
        let provider_scope = format!("provider:{}", provider.id);
        self.check_scope("provider", &provider_scope, &limits.provider, estimated_tokens, now)
            .await?;

        Ok(())
    }

    /// The tenant and agent portion of [`check`](Self::check), usable
    /// before a provider has been selected — the caller still must run the
    /// provider-scope check (via `check`, once a candidate is chosen)
    /// before actually dispatching.
    pub async fn check_tenant_and_agent(
        &self,
        tenant: &Tenant,
        agent_id: &AgentId,
        estimated_tokens: u64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), GatewayError> {
        let tenant_scope = format!("tenant:{}", tenant.id);
        self.check_scope("tenant", &tenant_scope, &tenant_limits(tenant, &self.defaults), estimated_tokens, now)
            .await?;

        let agent_scope = format!("agent:{}:{}", tenant.id, agent_id);
        self.check_scope("agent", &agent_scope, &self.defaults.agent, estimated_tokens, now)
            .await?;

        Ok(())
    }

    async fn check_scope(
        &self,
        scope_name: &str,
        scope_key: &str,
        limits: &ScopeLimits,
        estimated_tokens: u64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), GatewayError> {
        if let Some(limit) = limits.requests_per_minute {
            let count = self
                .counter(KeyKind::Counter, &minute_key(&format!("{scope_key}:req"), now))
                .await?;
            if count >= i64::from(limit) {
                return Err(GatewayError::RateLimitExceeded {
                    scope: scope_name.to_string(),
                    limit_kind: "requests_per_minute".to_string(),
                });
            }
        }
        if let Some(limit) = limits.tokens_per_minute {
            let count = self
                .counter(KeyKind::Counter, &minute_key(&format!("{scope_key}:tok"), now))
                .await?;
            #[allow(clippy::cast_possible_wrap)]
            let projected = count + estimated_tokens as i64;
            if projected > i64::try_from(limit).unwrap_or(i64::MAX) {
                return Err(GatewayError::RateLimitExceeded {
                    scope: scope_name.to_string(),
                    limit_kind: "tokens_per_minute".to_string(),
                });
            }
        }
        if let Some(limit) = limits.requests_per_day {
            let count = self
                .counter(KeyKind::Counter, &day_counter_key(&format!("{scope_key}:req"), now))
                .await?;
            if count >= i64::from(limit) {
                return Err(GatewayError::RateLimitExceeded {
                    scope: scope_name.to_string(),
                    limit_kind: "requests_per_day".to_string(),
                });
            }
        }
        if let Some(limit) = limits.max_concurrency {
            let count = self
                .counter(KeyKind::Counter, &concurrency_key(scope_key))
                .await?;
            if count >= i64::from(limit) {
                return Err(GatewayError::RateLimitExceeded {
                    scope: scope_name.to_string(),
                    limit_kind: "concurrency".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Record a request of `token_count` tokens against every scope's
    /// counters and acquire the provider's concurrency slot. Call only
    /// after [`check`](Self::check) has succeeded.
    pub async fn reserve(
        &self,
        tenant: &Tenant,
        agent_id: &AgentId,
        provider: &Provider,
        token_count: u64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<ConcurrencyPermit, GatewayError> {
        let tenant_scope = format!("tenant:{}", tenant.id);
        let agent_scope = format!("agent:{}:{}", tenant.id, agent_id);
        let provider_scope = format!("provider:{}", provider.id);

        self.bump_counters(&tenant_scope, token_count, now).await?;
        self.bump_counters(&agent_scope, token_count, now).await?;
        self.bump_counters(&provider_scope, token_count, now).await?;

        let concurrency_state_key =
            StateKey::global(KeyKind::Counter, concurrency_key(&provider_scope));
        self.state
            .increment(&concurrency_state_key, 1, Some(Duration::from_secs(300)))
            .await?;

        Ok(ConcurrencyPermit {
            state: Arc::clone(&self.state),
            key: concurrency_state_key,
        })
    }

    async fn bump_counters(
        &self,
        scope_key: &str,
        token_count: u64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), GatewayError> {
        let req_minute = StateKey::global(KeyKind::Counter, minute_key(&format!("{scope_key}:req"), now));
        self.state.increment(&req_minute, 1, Some(Duration::from_secs(120))).await?;

        let tok_minute = StateKey::global(KeyKind::Counter, minute_key(&format!("{scope_key}:tok"), now));
        #[allow(clippy::cast_possible_wrap)]
        self.state
            .increment(&tok_minute, token_count as i64, Some(Duration::from_secs(120)))
            .await?;

        let req_day = StateKey::global(KeyKind::Counter, day_counter_key(&format!("{scope_key}:req"), now));
        self.state.increment(&req_day, 1, Some(Duration::from_secs(172_800))).await?;

        Ok(())
    }
}
