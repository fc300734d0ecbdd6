//! Wires every crate together into one [`AppState`], and runs the
//! background supervisor scheduler that keeps it ticking.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use llmgate_analytics::AnalyticsAggregator;
use llmgate_breaker::CircuitBreakerRegistry;
use llmgate_credentials::CredentialPoolManager;
use llmgate_gateway::GatewayFacade;
use llmgate_health::{BotHealthChecker, NoopProbe};
use llmgate_notify::channel::{LogChannel, RenderedNotification};
use llmgate_notify::{ChannelRouter, NotificationPipeline, NotificationRequest, NotificationSchedule};
use llmgate_ratelimit::RateLimiter;
use llmgate_router::ProviderRouter;
use llmgate_state::StateStore;
use llmgate_state_memory::{MemoryDistributedLock, MemoryStateStore};
use llmgate_store::{
    ProviderStore, StateAdminAgentStore, StateAlertStore, StateBotStore, StateCredentialStore, StateHealthLogStore,
    StateProviderStore, StateTenantStore, StateUsageStore,
};
use llmgate_supervisor::SupervisorLoop;
use llmgate_tracker::UsageTracker;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::GatewayConfig;
use crate::dispatcher::StubDispatcher;
use crate::repositories::{
    AdminAgentAdapter, BotOwnershipAdapter, BotRepositoryAdapter, ProviderAdapter, StoreBackedCredentialSource,
    StubRestarter, TenantAdapter,
};

/// A completed supervisor cycle, summarized for `GET /admin/supervisor/last-tick`.
/// Synthesized here rather than inside `llmgate-supervisor` itself, since the
/// loop's own return type (per-tenant results and alerts) already carries
/// everything this summary needs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SupervisorTickReport {
    pub ran_at: DateTime<Utc>,
    pub tenants_processed: usize,
    pub bots_checked: u32,
    pub auto_heals_performed: u32,
    pub alerts_raised: u32,
    pub duration_ms: u64,
}

/// Every wired-up service the API handlers reach into.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayFacade>,
    pub tenants: Arc<StateTenantStore>,
    pub providers: Arc<StateProviderStore>,
    pub bots: Arc<StateBotStore>,
    pub admin_agents: Arc<StateAdminAgentStore>,
    pub credentials: Arc<StateCredentialStore>,
    pub credential_source: Arc<StoreBackedCredentialSource>,
    pub credential_pool: Arc<CredentialPoolManager>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub alerts: Arc<StateAlertStore>,
    pub analytics: Arc<AnalyticsAggregator>,
    pub supervisor: Arc<SupervisorLoop>,
    pub notify: Arc<NotificationPipeline>,
    pub schedule: NotificationSchedule,
    pub last_tick: Arc<RwLock<Option<SupervisorTickReport>>>,
}

/// Builds the in-memory backend and every service crate on top of it, then
/// registers a circuit breaker for each known provider before the registry
/// is handed out behind an `Arc`. Providers created later through the admin
/// API won't get a breaker until the process restarts — a known limitation
/// of `CircuitBreakerRegistry::register` requiring `&mut self`.
pub async fn build(config: &GatewayConfig) -> anyhow::Result<AppState> {
    let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let lock = Arc::new(MemoryDistributedLock::new());

    let tenant_store = Arc::new(StateTenantStore::new(Arc::clone(&state)));
    let provider_store = Arc::new(StateProviderStore::new(Arc::clone(&state)));
    let bot_store = Arc::new(StateBotStore::new(Arc::clone(&state)));
    let admin_agent_store = Arc::new(StateAdminAgentStore::new(Arc::clone(&state)));
    let credential_store = Arc::new(StateCredentialStore::new(Arc::clone(&state)));
    let usage_store = Arc::new(StateUsageStore::new(Arc::clone(&state)));
    let alert_store = Arc::new(StateAlertStore::new(Arc::clone(&state)));
    let health_log_store = Arc::new(StateHealthLogStore::new(Arc::clone(&state)));

    let mut breaker_registry = CircuitBreakerRegistry::new(Arc::clone(&state), Arc::clone(&lock) as _);
    for provider in provider_store.list().await? {
        breaker_registry.register(provider.id.clone(), config.circuit.clone());
    }
    let breakers = Arc::new(breaker_registry);

    let rate_limiter = Arc::new(RateLimiter::new(Arc::clone(&state), config.rate_limits.clone()));
    let router = Arc::new(ProviderRouter::new(Arc::clone(&breakers)));
    let tracker = Arc::new(UsageTracker::new(
        Arc::clone(&usage_store) as _,
        Arc::clone(&alert_store) as _,
    ));

    let credential_source = Arc::new(StoreBackedCredentialSource::new(Arc::clone(&credential_store) as _));
    for provider in provider_store.list().await? {
        credential_source.refresh(&provider.id).await?;
    }
    let credential_pool = Arc::new(CredentialPoolManager::new(
        Arc::clone(&credential_source) as _,
        Arc::clone(&state),
        Arc::clone(&lock) as _,
    ));

    let log_channel: Arc<dyn llmgate_notify::channel::NotificationChannel> = Arc::new(LogChannel);
    let email_channel: Arc<dyn llmgate_notify::channel::NotificationChannel> = match GatewayConfig::smtp()? {
        Some(smtp) => Arc::new(llmgate_notify::channel::EmailChannel::new(smtp.into_channel_config())),
        None => Arc::clone(&log_channel) as _,
    };
    let webhook_channel: Arc<dyn llmgate_notify::channel::NotificationChannel> = match GatewayConfig::webhook()? {
        Some(webhook) => Arc::new(llmgate_notify::channel::WebhookChannel::new(
            webhook.into_channel_config(),
            "supervisor_alert".to_string(),
            "warning".to_string(),
        )),
        None => Arc::clone(&log_channel) as _,
    };
    // WhatsApp transport needs a concrete `WhatsAppSender`, which is vendor
    // transport plumbing out of scope here; always falls back to the log
    // channel.
    let channel_router = ChannelRouter::new(
        Arc::clone(&log_channel),
        email_channel,
        webhook_channel,
        log_channel,
    );
    let throttle = llmgate_notify::NotificationThrottle::new(Arc::clone(&state));
    let notify = Arc::new(NotificationPipeline::new(channel_router, throttle));

    let tenant_adapter = Arc::new(TenantAdapter::new(Arc::clone(&tenant_store) as _));
    let provider_adapter = Arc::new(ProviderAdapter::new(Arc::clone(&provider_store) as _));
    let dispatcher = Arc::new(StubDispatcher);
    let schedule = NotificationSchedule::default();

    let gateway = Arc::new(GatewayFacade::new(
        Arc::clone(&tenant_adapter) as _,
        provider_adapter,
        Arc::clone(&rate_limiter),
        Arc::clone(&router),
        Arc::clone(&breakers),
        Arc::clone(&credential_pool),
        Arc::clone(&tracker),
        Arc::clone(&notify),
        dispatcher,
        schedule.clone(),
    ));

    let bot_ownership = Arc::new(BotOwnershipAdapter::new(Arc::clone(&bot_store) as _));
    let bot_repository = Arc::new(BotRepositoryAdapter::new(
        Arc::clone(&bot_store) as _,
        Arc::clone(&tenant_store) as _,
    ));
    let checker = Arc::new(BotHealthChecker::new(
        bot_repository,
        Arc::new(NoopProbe),
        Arc::clone(&health_log_store) as _,
    ));
    let admin_agent_adapter = Arc::new(AdminAgentAdapter::new(Arc::clone(&admin_agent_store) as _));
    let restarter = Arc::new(StubRestarter);

    let supervisor = Arc::new(SupervisorLoop::new(
        &config.supervisor_cron,
        config.supervisor_timezone,
        Arc::clone(&state),
        admin_agent_adapter,
        Arc::clone(&tenant_adapter) as _,
        bot_ownership,
        checker,
        Arc::clone(&health_log_store) as _,
        restarter,
    )?);

    let analytics = Arc::new(AnalyticsAggregator::new(Arc::clone(&usage_store) as _));

    Ok(AppState {
        gateway,
        tenants: tenant_store,
        providers: provider_store,
        bots: bot_store,
        admin_agents: admin_agent_store,
        credentials: credential_store,
        credential_source,
        credential_pool,
        breakers,
        alerts: alert_store,
        analytics,
        supervisor,
        notify,
        schedule,
        last_tick: Arc::new(RwLock::new(None)),
    })
}

/// Runs forever, sleeping until the supervisor's cron expression next fires,
/// ticking, dispatching any alerts the cycle raised, and recording a
/// `SupervisorTickReport` for the admin endpoint to read back.
pub async fn run_supervisor_scheduler(state: AppState) {
    loop {
        let now = Utc::now();
        let Some(next) = state.supervisor.next_occurrence(now) else {
            error!("supervisor cron expression never fires again, stopping scheduler");
            return;
        };
        let sleep_for = (next - now).to_std().unwrap_or(Duration::from_secs(1));
        tokio::time::sleep(sleep_for).await;

        let tick_started = Utc::now();
        match state.supervisor.tick(tick_started).await {
            Ok(Some(results)) => {
                let report = summarize_tick(tick_started, &results);
                for (_, alerts) in &results {
                    for alert in alerts {
                        dispatch_supervisor_alert(&state, alert).await;
                    }
                }
                info!(
                    tenants = report.tenants_processed,
                    bots = report.bots_checked,
                    heals = report.auto_heals_performed,
                    alerts = report.alerts_raised,
                    "supervisor tick complete"
                );
                *state.last_tick.write().await = Some(report);
            }
            Ok(None) => info!("supervisor tick skipped, another replica holds the claim"),
            Err(e) => warn!(error = %e, "supervisor tick failed"),
        }
    }
}

pub fn summarize_tick(
    ran_at: DateTime<Utc>,
    results: &[(llmgate_supervisor::TenantCycleResult, Vec<llmgate_supervisor::SupervisorAlert>)],
) -> SupervisorTickReport {
    let bots_checked = results
        .iter()
        .map(|(r, _)| r.healthy + r.degraded + r.unhealthy + r.dead)
        .sum();
    let auto_heals_performed = results
        .iter()
        .flat_map(|(r, _)| r.actions.iter())
        .filter(|a| a.succeeded)
        .count() as u32;
    let alerts_raised = results.iter().map(|(_, alerts)| alerts.len() as u32).sum();
    let duration_ms = results.iter().map(|(r, _)| r.duration_ms).max().unwrap_or(0);

    SupervisorTickReport {
        ran_at,
        tenants_processed: results.len(),
        bots_checked,
        auto_heals_performed,
        alerts_raised,
        duration_ms,
    }
}

pub(crate) async fn dispatch_supervisor_alert(state: &AppState, alert: &llmgate_supervisor::SupervisorAlert) {
    let request = NotificationRequest {
        admin_agent_id: alert.bot_id.to_string(),
        bot_id: Some(alert.bot_id.to_string()),
        alert_type: alert.alert_type.to_string(),
        severity: alert.severity,
        title: alert.title.clone(),
        rendered: RenderedNotification {
            subject: alert.title.clone(),
            text_body: alert.title.clone(),
            html_body: None,
        },
    };
    let outcome = state.notify.dispatch(&request, &state.schedule, Utc::now()).await;
    if !outcome.any_succeeded() && !outcome.throttled {
        warn!(bot_id = %alert.bot_id, "supervisor alert notification failed on every channel");
    }
}
