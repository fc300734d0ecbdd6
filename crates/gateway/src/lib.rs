//! Gateway Facade: end-to-end `complete` orchestration.
//!
//! Wires the rate limiter, provider router, circuit breaker registry,
//! credential pool and usage tracker together behind a single entry point.
//! Concurrency, cancellation-safety and guaranteed permit release are the
//! hard parts here — see [`GatewayFacade::complete`] for the shape of the
//! algorithm.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use llmgate_breaker::CircuitBreakerRegistry;
use llmgate_core::usage::estimate_tokens;
use llmgate_core::{AgentId, GatewayError, ModelId, Provider, ProviderId, Tenant, TenantId, UsageRecord};
use llmgate_credentials::{CredentialAlert, CredentialPoolManager};
use llmgate_notify::{render_budget_alert, NotificationPipeline, NotificationRequest, NotificationSchedule};
use llmgate_ratelimit::RateLimiter;
use llmgate_router::{InMemoryCapacity, ProviderRouter, SelectOptions};
use llmgate_tracker::{day_start, month_start, UsageTracker};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// How long a completion call may run before it is treated as cancelled.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One chat message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// A completion call as received from a tenant's calling application.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub tenant_id: TenantId,
    pub agent_id: AgentId,
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub prefer_provider: Option<ProviderId>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub channel: Option<String>,
    pub group_id: Option<String>,
    pub session_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(tenant_id: TenantId, agent_id: AgentId, messages: Vec<Message>) -> Self {
        Self {
            tenant_id,
            agent_id,
            messages,
            model: None,
            prefer_provider: None,
            max_tokens: None,
            temperature: None,
            channel: None,
            group_id: None,
            session_id: None,
            metadata: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Token usage and derived cost of one completed call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost: Decimal,
}

/// Response envelope for a successful completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: Uuid,
    pub model: ModelId,
    pub provider: ProviderId,
    pub content: String,
    pub usage: CompletionUsage,
    pub latency_ms: u64,
}

/// What a provider returned for one dispatched call. Token counts are
/// `None` when the provider's response doesn't carry them, in which case
/// the facade falls back to the `ceil(chars / 4)` estimate.
#[derive(Debug, Clone)]
pub struct ProviderCompletion {
    pub content: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// Pluggable upstream dispatch, one implementation per provider type tag.
/// Kept minimal and transport-agnostic: the facade only needs token counts
/// and text back, everything else (auth, retries at the HTTP layer, request
/// shaping) is the implementation's concern.
#[async_trait]
pub trait ProviderDispatcher: Send + Sync {
    async fn complete(
        &self,
        provider: &Provider,
        credential_id: &llmgate_core::CredentialId,
        request: &CompletionRequest,
    ) -> Result<ProviderCompletion, GatewayError>;
}

/// Source of tenant records, with the one mutation the facade itself needs
/// to apply: suspending a tenant that just crossed `suspendOnExceed`.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn get(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, GatewayError>;
    async fn set_suspended(&self, tenant_id: &TenantId, suspended: bool) -> Result<(), GatewayError>;
}

/// Source of the provider catalog available for routing.
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Provider>, GatewayError>;
}

fn alert_type_key(alert_type: llmgate_core::AlertType) -> &'static str {
    use llmgate_core::AlertType;
    match alert_type {
        AlertType::BudgetWarning => "budget_warning",
        AlertType::BudgetCritical => "budget_critical",
        AlertType::BudgetExceeded => "budget_exceeded",
        AlertType::DailyWarning => "daily_warning",
        AlertType::DailyExceeded => "daily_exceeded",
    }
}

fn total_chars_tokens(messages: &[Message]) -> u64 {
    messages.iter().map(|m| estimate_tokens(&m.content, 4)).sum()
}

fn resolved_model(provider: &Provider, requested: Option<&str>) -> ModelId {
    requested
        .filter(|model| provider.models.iter().any(|m| m == model))
        .or_else(|| provider.models.first().map(String::as_str))
        .map_or_else(|| ModelId::from("unknown"), ModelId::from)
}

fn compute_cost(provider: &Provider, input_tokens: u64, output_tokens: u64) -> Decimal {
    let thousand = Decimal::from(1000);
    let input = Decimal::from(input_tokens) * provider.cost_rates.input_cost_per_1k_tokens / thousand;
    let output = Decimal::from(output_tokens) * provider.cost_rates.output_cost_per_1k_tokens / thousand;
    (input + output).round_dp(8)
}

/// Held permit plus bookkeeping released exactly once, either explicitly on
/// a normal completion path or, if the surrounding future is ever dropped
/// before that, from `Drop` via a detached release task. This is what makes
/// permit release "guaranteed" in the face of caller-side cancellation —
/// nothing about the happy path depends on it, but it's the backstop.
struct PermitGuard {
    permit: Option<llmgate_ratelimit::ConcurrencyPermit>,
    capacity: Arc<llmgate_router::InMemoryCapacity>,
    provider_id: ProviderId,
}

impl PermitGuard {
    fn new(
        permit: llmgate_ratelimit::ConcurrencyPermit,
        capacity: Arc<llmgate_router::InMemoryCapacity>,
        provider_id: ProviderId,
    ) -> Self {
        Self { permit: Some(permit), capacity, provider_id }
    }

    async fn release(mut self) {
        if let Some(permit) = self.permit.take() {
            self.capacity.decrement(&self.provider_id);
            permit.release().await;
        }
    }
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.capacity.decrement(&self.provider_id);
            tokio::spawn(async move { permit.release().await });
        }
    }
}

/// End-to-end completion orchestration: rate limiting, provider selection,
/// circuit breaking, credential selection, dispatch and usage recording.
pub struct GatewayFacade {
    tenants: Arc<dyn TenantRepository>,
    providers: Arc<dyn ProviderRepository>,
    rate_limiter: Arc<RateLimiter>,
    router: Arc<ProviderRouter>,
    breakers: Arc<CircuitBreakerRegistry>,
    credentials: Arc<CredentialPoolManager>,
    tracker: Arc<UsageTracker>,
    notify: Arc<NotificationPipeline>,
    dispatcher: Arc<dyn ProviderDispatcher>,
    schedule: NotificationSchedule,
    /// Per-provider active-request view backing the router's capacity
    /// check, kept in sync with each provider's `max_concurrency` on every
    /// call and incremented/decremented around dispatch so a busy
    /// provider is skipped in favor of the next one by priority instead
    /// of always being chosen and then failing the rate limiter.
    capacity: Arc<InMemoryCapacity>,
}

impl GatewayFacade {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        providers: Arc<dyn ProviderRepository>,
        rate_limiter: Arc<RateLimiter>,
        router: Arc<ProviderRouter>,
        breakers: Arc<CircuitBreakerRegistry>,
        credentials: Arc<CredentialPoolManager>,
        tracker: Arc<UsageTracker>,
        notify: Arc<NotificationPipeline>,
        dispatcher: Arc<dyn ProviderDispatcher>,
        schedule: NotificationSchedule,
    ) -> Self {
        Self {
            tenants,
            providers,
            rate_limiter,
            router,
            breakers,
            credentials,
            tracker,
            notify,
            dispatcher,
            schedule,
            capacity: Arc::new(InMemoryCapacity::default()),
        }
    }

    async fn load_active_tenant(&self, tenant_id: &TenantId) -> Result<Tenant, GatewayError> {
        let tenant = self
            .tenants
            .get(tenant_id)
            .await?
            .ok_or_else(|| GatewayError::UnknownTenant(tenant_id.clone()))?;
        if tenant.deleted {
            return Err(GatewayError::UnknownTenant(tenant_id.clone()));
        }
        if tenant.suspended {
            return Err(GatewayError::TenantSuspended(tenant_id.clone()));
        }
        Ok(tenant)
    }

    /// Daily and monthly budget pre-checks, reusing the same cost
    /// accounting the alert engine uses so a request never slips through
    /// between an alert firing and the next usage write.
    async fn check_budgets(&self, tenant: &Tenant, now: DateTime<Utc>) -> Result<(), GatewayError> {
        if let Some(daily_budget) = tenant.daily_budget {
            let used = self.tracker.cost_since(tenant, day_start(now)).await?;
            if used >= daily_budget {
                return Err(GatewayError::BudgetExceeded(tenant.id.clone()));
            }
        }
        if tenant.monthly_budget > Decimal::ZERO {
            let used = self.tracker.cost_since(tenant, month_start(now)).await?;
            if used >= tenant.monthly_budget {
                return Err(GatewayError::BudgetExceeded(tenant.id.clone()));
            }
        }
        Ok(())
    }

    /// Fan out each alert outcome from a usage write to the notification
    /// pipeline. Best-effort: a delivery failure is logged, never
    /// propagated, matching the tracker's own "alerts never fail a
    /// completed call" contract.
    async fn dispatch_alert_notifications(&self, tenant: &Tenant, outcomes: &[llmgate_tracker::AlertOutcome], now: DateTime<Utc>) {
        for outcome in outcomes {
            if !outcome.is_new {
                continue;
            }
            let rendered = render_budget_alert(&outcome.alert, &tenant.name);
            let request = NotificationRequest {
                admin_agent_id: tenant.id.to_string(),
                bot_id: None,
                alert_type: alert_type_key(outcome.alert.alert_type).to_string(),
                severity: outcome.alert.severity,
                title: rendered.subject.clone(),
                rendered,
            };
            let result = self.notify.dispatch(&request, &self.schedule, now).await;
            if !result.any_succeeded() && !result.throttled {
                warn!(tenant = %tenant.id, alert = ?outcome.alert.alert_type, "budget alert notification failed on every channel");
            }
        }
    }

    /// Dispatch an emergency-activation alert from the credential pool,
    /// matching the supervisor loop's contract that the manager raising
    /// the alert does not own its own dispatch.
    async fn dispatch_credential_alert(&self, alert: &CredentialAlert, now: DateTime<Utc>) {
        let request = NotificationRequest {
            admin_agent_id: alert.provider_id.to_string(),
            bot_id: None,
            alert_type: alert.alert_type.to_string(),
            severity: alert.severity,
            title: alert.title.clone(),
            rendered: llmgate_notify::RenderedNotification {
                subject: alert.title.clone(),
                text_body: alert.title.clone(),
                html_body: None,
            },
        };
        let result = self.notify.dispatch(&request, &self.schedule, now).await;
        if !result.any_succeeded() && !result.throttled {
            warn!(provider = %alert.provider_id, "emergency-activation alert notification failed on every channel");
        }
    }

    async fn apply_suspension(&self, tenant: &Tenant, mutation: Option<llmgate_tracker::TenantMutation>) {
        if matches!(mutation, Some(llmgate_tracker::TenantMutation::Suspend)) {
            if let Err(e) = self.tenants.set_suspended(&tenant.id, true).await {
                warn!(tenant = %tenant.id, error = %e, "failed to persist auto-suspension after budget exceeded");
            }
        }
    }

    /// Run one completion call end to end.
    ///
    /// # Errors
    ///
    /// Returns whichever [`GatewayError`] is raised first: an unknown or
    /// suspended tenant, a disallowed agent, an exhausted budget, a denied
    /// rate-limit check, an unavailable provider, or an upstream dispatch
    /// failure (propagated after usage is recorded).
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, GatewayError> {
        let now = Utc::now();
        let tenant = self.load_active_tenant(&request.tenant_id).await?;

        if !tenant.allows_agent(&request.agent_id) {
            return Err(GatewayError::AgentNotAllowed {
                tenant: tenant.id.clone(),
                agent: request.agent_id.to_string(),
            });
        }
        self.check_budgets(&tenant, now).await?;

        let estimated_input_tokens = total_chars_tokens(&request.messages);
        // Rate-limit decision precedes provider selection: a tenant/agent
        // over its own limits never reaches `router.select`, let alone a
        // provider dispatch.
        self.rate_limiter
            .check_tenant_and_agent(&tenant, &request.agent_id, estimated_input_tokens, now)
            .await?;

        let providers = self.providers.list().await?;
        for provider in &providers {
            self.capacity.set_limit(provider.id.clone(), provider.max_concurrency);
        }
        let options = SelectOptions {
            model: request.model.clone(),
            prefer_provider: request.prefer_provider.clone(),
        };
        let selection = self
            .router
            .select(&tenant, &providers, &options, self.capacity.as_ref())
            .await
            .map_err(|_| GatewayError::NoAvailableProvider(tenant.id.clone()))?;
        let provider = selection.provider;

        self.rate_limiter
            .check(&tenant, &request.agent_id, &provider, estimated_input_tokens, now)
            .await?;

        let permit = PermitGuard::new(
            self.rate_limiter
                .reserve(&tenant, &request.agent_id, &provider, estimated_input_tokens, now)
                .await?,
            self.capacity.clone(),
            provider.id.clone(),
        );
        self.capacity.increment(&provider.id);

        let (credential, alert) = self.credentials.select_best(&provider.id, false).await;
        if let Some(alert) = &alert {
            self.dispatch_credential_alert(alert, now).await;
        }
        let credential = match credential {
            Ok(credential) => credential,
            Err(e) => {
                permit.release().await;
                return Err(e);
            }
        };

        info!(tenant = %tenant.id, provider = %provider.id, reason = %selection.reason, "dispatching completion");
        let outcome = self
            .dispatch_and_record(&tenant, &request, &provider, &credential.id, estimated_input_tokens, now)
            .await;
        permit.release().await;
        outcome
    }

    /// The part of `complete` that talks to the provider and records usage
    /// — split out so both the success and failure paths share one place
    /// that builds the usage record and runs alert dispatch.
    async fn dispatch_and_record(
        &self,
        tenant: &Tenant,
        request: &CompletionRequest,
        provider: &Provider,
        credential_id: &llmgate_core::CredentialId,
        estimated_input_tokens: u64,
        started_at: DateTime<Utc>,
    ) -> Result<CompletionResponse, GatewayError> {
        let dispatch_result = tokio::time::timeout(
            request.timeout,
            self.dispatcher.complete(provider, credential_id, request),
        )
        .await;
        let finished_at = Utc::now();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let latency_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        match dispatch_result {
            Ok(Ok(completion)) => {
                let input_tokens = completion.input_tokens.unwrap_or(estimated_input_tokens);
                let output_tokens = completion
                    .output_tokens
                    .unwrap_or_else(|| estimate_tokens(&completion.content, 4));
                let cost = compute_cost(provider, input_tokens, output_tokens);

                if let Some(breaker) = self.breakers.get(&provider.id) {
                    breaker.record_success().await;
                }

                let record = UsageRecord::new(
                    tenant.id.clone(),
                    request.agent_id.clone(),
                    provider.id.clone(),
                    Some(credential_id.clone()),
                    resolved_model(provider, request.model.as_deref()),
                    input_tokens,
                    output_tokens,
                    cost,
                    true,
                    latency_ms,
                    None,
                    finished_at,
                );
                let response_id = record.id;

                match self.tracker.write_usage(record, tenant).await {
                    Ok((outcomes, mutation)) => {
                        self.dispatch_alert_notifications(tenant, &outcomes, finished_at).await;
                        self.apply_suspension(tenant, mutation).await;
                    }
                    Err(e) => warn!(tenant = %tenant.id, error = %e, "failed to write usage record for successful completion"),
                }

                if let Err(e) = self
                    .credentials
                    .update_usage(credential_id, input_tokens + output_tokens, true)
                    .await
                {
                    warn!(credential = %credential_id, error = %e, "failed to record credential usage");
                }

                Ok(CompletionResponse {
                    id: response_id,
                    model: resolved_model(provider, request.model.as_deref()),
                    provider: provider.id.clone(),
                    content: completion.content,
                    usage: CompletionUsage {
                        input_tokens,
                        output_tokens,
                        total_tokens: input_tokens + output_tokens,
                        cost,
                    },
                    latency_ms,
                })
            }
            Ok(Err(err)) => {
                self.record_failure(tenant, request, provider, credential_id, estimated_input_tokens, latency_ms, finished_at, &err.to_string())
                    .await;
                Err(err)
            }
            Err(_elapsed) => {
                // Gateway-side timeout: the only form of "cancellation" this
                // facade can observe and still act on, since a caller that
                // simply drops the outer future never notifies us.
                self.record_failure(
                    tenant,
                    request,
                    provider,
                    credential_id,
                    estimated_input_tokens,
                    latency_ms,
                    finished_at,
                    "cancelled",
                )
                .await;
                Err(GatewayError::TransientUpstream {
                    provider: provider.id.clone(),
                    message: "cancelled".to_string(),
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_failure(
        &self,
        tenant: &Tenant,
        request: &CompletionRequest,
        provider: &Provider,
        credential_id: &llmgate_core::CredentialId,
        estimated_input_tokens: u64,
        latency_ms: u64,
        finished_at: DateTime<Utc>,
        error_message: &str,
    ) {
        if let Some(breaker) = self.breakers.get(&provider.id) {
            breaker.record_failure().await;
        }

        let record = UsageRecord::new(
            tenant.id.clone(),
            request.agent_id.clone(),
            provider.id.clone(),
            Some(credential_id.clone()),
            resolved_model(provider, request.model.as_deref()),
            estimated_input_tokens,
            0,
            Decimal::ZERO,
            false,
            latency_ms,
            Some(error_message.to_string()),
            finished_at,
        );

        if let Err(e) = self.credentials.update_usage(credential_id, 0, false).await {
            warn!(credential = %credential_id, error = %e, "failed to record credential failure");
        }

        match self.tracker.write_usage(record, tenant).await {
            Ok((outcomes, mutation)) => {
                self.dispatch_alert_notifications(tenant, &outcomes, finished_at).await;
                self.apply_suspension(tenant, mutation).await;
            }
            Err(e) => warn!(tenant = %tenant.id, error = %e, "failed to write usage record for failed completion"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_breaker::CircuitBreakerConfig;
    use llmgate_core::{
        CostRates, CredentialId, CredentialStatus, ProviderStatus, ProviderType, TenantAlertThresholds,
        TenantLimits,
    };
    use llmgate_credentials::StaticCredentialPool;
    use llmgate_notify::{ChannelRouter, NotificationThrottle};
    use llmgate_ratelimit::RateLimitDefaults;
    use llmgate_state_memory::{MemoryDistributedLock, MemoryStateStore};
    use llmgate_store::{StateAlertStore, StateUsageStore};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    fn provider(id: &str) -> Provider {
        Provider {
            id: ProviderId::from(id),
            name: "Test Provider".into(),
            provider_type: ProviderType::Vendor,
            priority: 1,
            status: ProviderStatus::Active,
            rate_limit_per_minute: 1000,
            max_concurrency: 10,
            cost_rates: CostRates {
                input_cost_per_1k_tokens: Decimal::new(1, 2),
                output_cost_per_1k_tokens: Decimal::new(2, 2),
            },
            models: vec!["gpt-test".to_string()],
            updated_at: Utc::now(),
        }
    }

    fn tenant(id: &str) -> Tenant {
        Tenant {
            id: TenantId::from(id),
            name: "Acme".into(),
            monthly_budget: Decimal::new(10000, 2),
            daily_budget: None,
            limits: TenantLimits::default(),
            allowed_agents: vec![],
            allowed_providers: vec![],
            suspended: false,
            suspend_on_exceed: false,
            deleted: false,
            alert_thresholds: TenantAlertThresholds::default(),
            created_at: Utc::now(),
        }
    }

    struct FixedTenants {
        tenant: Mutex<Tenant>,
    }

    #[async_trait]
    impl TenantRepository for FixedTenants {
        async fn get(&self, _tenant_id: &TenantId) -> Result<Option<Tenant>, GatewayError> {
            Ok(Some(self.tenant.lock().await.clone()))
        }

        async fn set_suspended(&self, _tenant_id: &TenantId, suspended: bool) -> Result<(), GatewayError> {
            self.tenant.lock().await.suspended = suspended;
            Ok(())
        }
    }

    struct FixedProviders {
        providers: Vec<Provider>,
    }

    #[async_trait]
    impl ProviderRepository for FixedProviders {
        async fn list(&self) -> Result<Vec<Provider>, GatewayError> {
            Ok(self.providers.clone())
        }
    }

    struct EchoDispatcher {
        fail: AtomicBool,
        delay: Duration,
    }

    #[async_trait]
    impl ProviderDispatcher for EchoDispatcher {
        async fn complete(
            &self,
            _provider: &Provider,
            _credential_id: &CredentialId,
            request: &CompletionRequest,
        ) -> Result<ProviderCompletion, GatewayError> {
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(GatewayError::TransientUpstream {
                    provider: ProviderId::from("p1"),
                    message: "upstream 500".to_string(),
                });
            }
            let reply: String = request.messages.iter().map(|m| m.content.clone()).collect();
            Ok(ProviderCompletion {
                content: reply,
                input_tokens: None,
                output_tokens: None,
            })
        }
    }

    fn facade(dispatcher: Arc<dyn ProviderDispatcher>, tenant: Tenant) -> GatewayFacade {
        let state = Arc::new(MemoryStateStore::new());
        let lock = Arc::new(MemoryDistributedLock::new());

        let credential_pool = Arc::new(StaticCredentialPool::new());
        credential_pool.set_credentials(
            ProviderId::from("p1"),
            vec![llmgate_core::Credential {
                id: CredentialId::from("c1"),
                provider_id: ProviderId::from("p1"),
                priority: 1,
                status: CredentialStatus::Active,
                emergency: false,
                quota_limit: None,
                quota_used: 0,
                last_used_at: None,
                cost_used: Decimal::ZERO,
                last_error_at: None,
            }],
        );

        let mut breakers = CircuitBreakerRegistry::new(state.clone(), lock.clone());
        breakers.register(ProviderId::from("p1"), CircuitBreakerConfig::default());
        let breakers = Arc::new(breakers);

        let usage_store = Arc::new(StateUsageStore::new(state.clone()));
        let alert_store = Arc::new(StateAlertStore::new(state.clone()));

        GatewayFacade::new(
            Arc::new(FixedTenants { tenant: Mutex::new(tenant) }),
            Arc::new(FixedProviders { providers: vec![provider("p1")] }),
            Arc::new(RateLimiter::new(state.clone(), RateLimitDefaults::default())),
            Arc::new(ProviderRouter::new(breakers.clone())),
            breakers,
            Arc::new(CredentialPoolManager::new(credential_pool, state, lock)),
            Arc::new(UsageTracker::new(usage_store, alert_store)),
            Arc::new(NotificationPipeline::new(
                ChannelRouter::new(
                    Arc::new(llmgate_notify::channel::LogChannel),
                    Arc::new(llmgate_notify::channel::LogChannel),
                    Arc::new(llmgate_notify::channel::LogChannel),
                    Arc::new(llmgate_notify::channel::LogChannel),
                ),
                NotificationThrottle::new(Arc::new(MemoryStateStore::new())),
            )),
            dispatcher,
            NotificationSchedule::default(),
        )
    }

    #[tokio::test]
    async fn successful_completion_returns_usage_and_cost() {
        let facade = facade(
            Arc::new(EchoDispatcher { fail: AtomicBool::new(false), delay: Duration::ZERO }),
            tenant("t1"),
        );
        let request = CompletionRequest::new(
            TenantId::from("t1"),
            AgentId::from("agent-1"),
            vec![Message { role: "user".into(), content: "hello".into() }],
        );
        let response = facade.complete(request).await.unwrap();
        assert_eq!(response.content, "hello");
        assert!(response.usage.cost >= Decimal::ZERO);
    }

    #[tokio::test]
    async fn suspended_tenant_is_rejected_before_dispatch() {
        let mut t = tenant("t1");
        t.suspended = true;
        let facade = facade(
            Arc::new(EchoDispatcher { fail: AtomicBool::new(false), delay: Duration::ZERO }),
            t,
        );
        let request = CompletionRequest::new(
            TenantId::from("t1"),
            AgentId::from("agent-1"),
            vec![Message { role: "user".into(), content: "hi".into() }],
        );
        let err = facade.complete(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::TenantSuspended(_)));
    }

    #[tokio::test]
    async fn exhausted_monthly_budget_blocks_the_call() {
        let mut t = tenant("t1");
        t.monthly_budget = Decimal::ZERO;
        let facade = facade(
            Arc::new(EchoDispatcher { fail: AtomicBool::new(false), delay: Duration::ZERO }),
            t,
        );
        let request = CompletionRequest::new(
            TenantId::from("t1"),
            AgentId::from("agent-1"),
            vec![Message { role: "user".into(), content: "hi".into() }],
        );
        let err = facade.complete(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::BudgetExceeded(_)));
    }

    #[tokio::test]
    async fn disallowed_agent_is_rejected() {
        let mut t = tenant("t1");
        t.allowed_agents = vec![AgentId::from("only-this-one")];
        let facade = facade(
            Arc::new(EchoDispatcher { fail: AtomicBool::new(false), delay: Duration::ZERO }),
            t,
        );
        let request = CompletionRequest::new(
            TenantId::from("t1"),
            AgentId::from("someone-else"),
            vec![Message { role: "user".into(), content: "hi".into() }],
        );
        let err = facade.complete(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::AgentNotAllowed { .. }));
    }

    #[tokio::test]
    async fn upstream_failure_trips_breaker_and_re_raises() {
        let facade = facade(
            Arc::new(EchoDispatcher { fail: AtomicBool::new(true), delay: Duration::ZERO }),
            tenant("t1"),
        );
        let request = CompletionRequest::new(
            TenantId::from("t1"),
            AgentId::from("agent-1"),
            vec![Message { role: "user".into(), content: "hi".into() }],
        );
        let err = facade.complete(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::TransientUpstream { .. }));
        assert_eq!(
            facade.breakers.get(&ProviderId::from("p1")).unwrap().state().await,
            llmgate_breaker::CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn timeout_is_recorded_as_a_failed_cancelled_usage_entry() {
        let facade = facade(
            Arc::new(EchoDispatcher { fail: AtomicBool::new(false), delay: Duration::from_millis(200) }),
            tenant("t1"),
        );
        let mut request = CompletionRequest::new(
            TenantId::from("t1"),
            AgentId::from("agent-1"),
            vec![Message { role: "user".into(), content: "hi".into() }],
        );
        request.timeout = Duration::from_millis(20);
        let err = facade.complete(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::TransientUpstream { message, .. } if message == "cancelled"));
    }

    #[tokio::test]
    async fn unknown_tenant_is_rejected() {
        let facade = facade(
            Arc::new(EchoDispatcher { fail: AtomicBool::new(false), delay: Duration::ZERO }),
            tenant("t1"),
        );
        let request = CompletionRequest::new(
            TenantId::from("does-not-exist"),
            AgentId::from("agent-1"),
            vec![Message { role: "user".into(), content: "hi".into() }],
        );
        // FixedTenants always returns the seeded tenant regardless of id in
        // this harness, so exercise the unknown-tenant path against a repo
        // that actually returns None.
        struct EmptyTenants;
        #[async_trait]
        impl TenantRepository for EmptyTenants {
            async fn get(&self, _tenant_id: &TenantId) -> Result<Option<Tenant>, GatewayError> {
                Ok(None)
            }
            async fn set_suspended(&self, _tenant_id: &TenantId, _suspended: bool) -> Result<(), GatewayError> {
                Ok(())
            }
        }
        let mut facade = facade;
        facade.tenants = Arc::new(EmptyTenants);
        let err = facade.complete(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownTenant(_)));
    }

    #[tokio::test]
    async fn budget_warning_at_ten_percent_remaining_routes_to_email_only() {
        let facade = facade(
            Arc::new(EchoDispatcher { fail: AtomicBool::new(false), delay: Duration::ZERO }),
            tenant("t1"),
        );
        let mut t1 = tenant("t1");
        t1.monthly_budget = Decimal::new(10000, 2); // 100.00

        let record = UsageRecord {
            id: Uuid::new_v4(),
            tenant_id: t1.id.clone(),
            agent_id: AgentId::from("agent-1"),
            provider_id: ProviderId::from("p1"),
            credential_id: None,
            model_id: llmgate_core::ModelId::from("gpt-test"),
            input_tokens: 1,
            output_tokens: 1,
            total_tokens: 2,
            cost: Decimal::new(900001, 4), // 90.0001
            succeeded: true,
            latency_ms: 10,
            error_message: None,
            created_at: Utc::now(),
        };

        let (outcomes, mutation) = facade.tracker.write_usage(record, &t1).await.unwrap();
        assert!(mutation.is_none());
        assert_eq!(outcomes.len(), 1);
        let outcome = &outcomes[0];
        assert!(outcome.is_new);
        assert_eq!(outcome.alert.alert_type, llmgate_core::AlertType::BudgetWarning);
        assert_eq!(outcome.alert.threshold, Decimal::new(10, 2));
        assert!((outcome.alert.percent_used - Decimal::new(900001, 6)).abs() < Decimal::new(1, 6));

        let rendered = llmgate_notify::render_budget_alert(&outcome.alert, &t1.name);
        assert!(rendered.subject.contains("10%") || rendered.text_body.contains("10%"));

        let request = NotificationRequest {
            admin_agent_id: t1.id.to_string(),
            bot_id: None,
            alert_type: "budget_warning".to_string(),
            severity: outcome.alert.severity,
            title: rendered.subject.clone(),
            rendered,
        };
        let dispatch = facade.notify.dispatch(&request, &facade.schedule, Utc::now()).await;
        assert!(dispatch.channel_results.contains_key("email"));
        assert_eq!(dispatch.channel_results.len(), 1);
    }

    #[tokio::test]
    async fn rate_limit_precedes_provider_selection() {
        let state = Arc::new(MemoryStateStore::new());
        let lock = Arc::new(MemoryDistributedLock::new());

        let credential_pool = Arc::new(StaticCredentialPool::new());
        credential_pool.set_credentials(
            ProviderId::from("p1"),
            vec![llmgate_core::Credential {
                id: CredentialId::from("c1"),
                provider_id: ProviderId::from("p1"),
                priority: 1,
                status: CredentialStatus::Active,
                emergency: false,
                quota_limit: None,
                quota_used: 0,
                last_used_at: None,
                cost_used: Decimal::ZERO,
                last_error_at: None,
            }],
        );

        let mut breakers = CircuitBreakerRegistry::new(state.clone(), lock.clone());
        breakers.register(ProviderId::from("p1"), CircuitBreakerConfig::default());
        let breakers = Arc::new(breakers);

        let usage_store = Arc::new(StateUsageStore::new(state.clone()));
        let alert_store = Arc::new(StateAlertStore::new(state.clone()));

        let mut limits = RateLimitDefaults::default();
        limits.tenant.requests_per_minute = Some(2);

        let facade = GatewayFacade::new(
            Arc::new(FixedTenants { tenant: Mutex::new(tenant("t2")) }),
            Arc::new(FixedProviders { providers: vec![provider("p1")] }),
            Arc::new(RateLimiter::new(state.clone(), limits)),
            Arc::new(ProviderRouter::new(breakers.clone())),
            breakers,
            Arc::new(CredentialPoolManager::new(credential_pool, state, lock)),
            Arc::new(UsageTracker::new(usage_store, alert_store)),
            Arc::new(NotificationPipeline::new(
                ChannelRouter::new(
                    Arc::new(llmgate_notify::channel::LogChannel),
                    Arc::new(llmgate_notify::channel::LogChannel),
                    Arc::new(llmgate_notify::channel::LogChannel),
                    Arc::new(llmgate_notify::channel::LogChannel),
                ),
                NotificationThrottle::new(Arc::new(MemoryStateStore::new())),
            )),
            Arc::new(EchoDispatcher { fail: AtomicBool::new(false), delay: Duration::ZERO }),
            NotificationSchedule::default(),
        );

        let make_request = || {
            CompletionRequest::new(
                TenantId::from("t2"),
                AgentId::from("agent-1"),
                vec![Message { role: "user".into(), content: "hi".into() }],
            )
        };

        assert!(facade.complete(make_request()).await.is_ok());
        assert!(facade.complete(make_request()).await.is_ok());
        let err = facade.complete(make_request()).await.unwrap_err();
        // The completion API's fixed `retryAfter = 60` for this error is a
        // server-layer response detail (see `crates/server/src/error.rs`),
        // not part of the error value itself.
        assert!(matches!(err, GatewayError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn router_falls_back_past_an_open_circuit() {
        let state = Arc::new(MemoryStateStore::new());
        let lock = Arc::new(MemoryDistributedLock::new());

        let credential_pool = Arc::new(StaticCredentialPool::new());
        for id in ["p1", "p2"] {
            credential_pool.set_credentials(
                ProviderId::from(id),
                vec![llmgate_core::Credential {
                    id: CredentialId::from(format!("c-{id}")),
                    provider_id: ProviderId::from(id),
                    priority: 1,
                    status: CredentialStatus::Active,
                    emergency: false,
                    quota_limit: None,
                    quota_used: 0,
                    last_used_at: None,
                    cost_used: Decimal::ZERO,
                    last_error_at: None,
                }],
            );
        }

        let mut breakers = CircuitBreakerRegistry::new(state.clone(), lock.clone());
        breakers.register(ProviderId::from("p1"), CircuitBreakerConfig::default());
        breakers.register(ProviderId::from("p2"), CircuitBreakerConfig::default());
        breakers.get(&ProviderId::from("p1")).unwrap().trip().await;
        let breakers = Arc::new(breakers);

        let usage_store = Arc::new(StateUsageStore::new(state.clone()));
        let alert_store = Arc::new(StateAlertStore::new(state.clone()));

        let mut p1 = provider("p1");
        p1.priority = 1;
        let mut p2 = provider("p2");
        p2.priority = 2;

        let facade = GatewayFacade::new(
            Arc::new(FixedTenants { tenant: Mutex::new(tenant("t1")) }),
            Arc::new(FixedProviders { providers: vec![p1, p2] }),
            Arc::new(RateLimiter::new(state.clone(), RateLimitDefaults::default())),
            Arc::new(ProviderRouter::new(breakers.clone())),
            breakers,
            Arc::new(CredentialPoolManager::new(credential_pool, state, lock)),
            Arc::new(UsageTracker::new(usage_store, alert_store)),
            Arc::new(NotificationPipeline::new(
                ChannelRouter::new(
                    Arc::new(llmgate_notify::channel::LogChannel),
                    Arc::new(llmgate_notify::channel::LogChannel),
                    Arc::new(llmgate_notify::channel::LogChannel),
                    Arc::new(llmgate_notify::channel::LogChannel),
                ),
                NotificationThrottle::new(Arc::new(MemoryStateStore::new())),
            )),
            Arc::new(EchoDispatcher { fail: AtomicBool::new(false), delay: Duration::ZERO }),
            NotificationSchedule::default(),
        );

        let request = CompletionRequest::new(
            TenantId::from("t1"),
            AgentId::from("agent-1"),
            vec![Message { role: "user".into(), content: "hi".into() }],
        );
        let response = facade.complete(request).await.unwrap();
        assert_eq!(response.provider, ProviderId::from("p2"));
    }

    #[tokio::test]
    async fn router_falls_back_past_a_provider_at_capacity() {
        let state = Arc::new(MemoryStateStore::new());
        let lock = Arc::new(MemoryDistributedLock::new());

        let credential_pool = Arc::new(StaticCredentialPool::new());
        for id in ["p1", "p2"] {
            credential_pool.set_credentials(
                ProviderId::from(id),
                vec![llmgate_core::Credential {
                    id: CredentialId::from(format!("c-{id}")),
                    provider_id: ProviderId::from(id),
                    priority: 1,
                    status: CredentialStatus::Active,
                    emergency: false,
                    quota_limit: None,
                    quota_used: 0,
                    last_used_at: None,
                    cost_used: Decimal::ZERO,
                    last_error_at: None,
                }],
            );
        }

        let mut breakers = CircuitBreakerRegistry::new(state.clone(), lock.clone());
        breakers.register(ProviderId::from("p1"), CircuitBreakerConfig::default());
        breakers.register(ProviderId::from("p2"), CircuitBreakerConfig::default());
        let breakers = Arc::new(breakers);

        let usage_store = Arc::new(StateUsageStore::new(state.clone()));
        let alert_store = Arc::new(StateAlertStore::new(state.clone()));

        let mut p1 = provider("p1");
        p1.priority = 1;
        p1.max_concurrency = 1;
        let mut p2 = provider("p2");
        p2.priority = 2;

        let facade = Arc::new(GatewayFacade::new(
            Arc::new(FixedTenants { tenant: Mutex::new(tenant("t1")) }),
            Arc::new(FixedProviders { providers: vec![p1, p2] }),
            Arc::new(RateLimiter::new(state.clone(), RateLimitDefaults::default())),
            Arc::new(ProviderRouter::new(breakers.clone())),
            breakers,
            Arc::new(CredentialPoolManager::new(credential_pool, state, lock)),
            Arc::new(UsageTracker::new(usage_store, alert_store)),
            Arc::new(NotificationPipeline::new(
                ChannelRouter::new(
                    Arc::new(llmgate_notify::channel::LogChannel),
                    Arc::new(llmgate_notify::channel::LogChannel),
                    Arc::new(llmgate_notify::channel::LogChannel),
                    Arc::new(llmgate_notify::channel::LogChannel),
                ),
                NotificationThrottle::new(Arc::new(MemoryStateStore::new())),
            )),
            Arc::new(EchoDispatcher { fail: AtomicBool::new(false), delay: Duration::from_millis(100) }),
            NotificationSchedule::default(),
        ));

        let make_request = || {
            CompletionRequest::new(
                TenantId::from("t1"),
                AgentId::from("agent-1"),
                vec![Message { role: "user".into(), content: "hi".into() }],
            )
        };

        // Occupy p1's single concurrency slot with a slow in-flight call,
        // then issue a second call while the first is still running: it
        // must be routed to the free p2 instead of queueing behind p1.
        let holder = facade.clone();
        let in_flight = tokio::spawn(async move { holder.complete(make_request()).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = facade.complete(make_request()).await.unwrap();
        assert_eq!(second.provider, ProviderId::from("p2"));

        let first = in_flight.await.unwrap().unwrap();
        assert_eq!(first.provider, ProviderId::from("p1"));
    }
}
