//! Supervisor Loop: a cron-scheduled, non-overlapping tick that fans out to
//! every active tenant's bots, health-checks and auto-heals them, and
//! alerts on state transitions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use llmgate_core::{AdminAgent, BotId, GatewayError, HealthClassification, Tenant, TenantId};
use llmgate_health::BotHealthChecker;
use llmgate_state::{KeyKind, StateKey, StateStore};
use llmgate_store::HealthLogStore;
use tracing::{info, warn};

/// Claim TTL for a single tick, preventing two replicas from running the
/// same cycle concurrently.
const CLAIM_TTL: Duration = Duration::from_secs(5 * 60);

/// Looks up admin agents eligible for a supervisor cycle.
#[async_trait]
pub trait AdminAgentRepository: Send + Sync {
    /// All admin agents whose status is `Active` and health-check is
    /// enabled, grouped by tenant.
    async fn active_agents(&self) -> Result<Vec<AdminAgent>, GatewayError>;
}

/// Looks up tenants and the bots they own.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn get(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, GatewayError>;
}

#[async_trait]
pub trait BotOwnership: Send + Sync {
    /// Every bot id owned by `tenant_id`.
    async fn bots_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<BotId>, GatewayError>;
}

/// A restart action attempted against a dead or unhealthy bot.
#[async_trait]
pub trait RestartAction: Send + Sync {
    async fn restart(&self, bot_id: &BotId) -> Result<(), String>;
}

/// One action taken during a tick (a restart attempt or an alert),
/// retained on the tick's result for operator inspection.
#[derive(Debug, Clone)]
pub struct TickAction {
    pub bot_id: BotId,
    pub description: String,
    pub succeeded: bool,
}

/// Outcome of a single tenant's cycle within one tick.
#[derive(Debug, Clone, Default)]
pub struct TenantCycleResult {
    pub tenant_id: String,
    pub healthy: u32,
    pub degraded: u32,
    pub unhealthy: u32,
    pub dead: u32,
    pub actions: Vec<TickAction>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// An alert raised by the supervisor loop, handed to the notification
/// pipeline by the caller (the supervisor itself does not own dispatch).
#[derive(Debug, Clone)]
pub struct SupervisorAlert {
    pub bot_id: BotId,
    pub alert_type: &'static str,
    pub severity: llmgate_core::AlertSeverity,
    pub title: String,
}

pub struct SupervisorLoop {
    state: Arc<dyn StateStore>,
    agents: Arc<dyn AdminAgentRepository>,
    tenants: Arc<dyn TenantRepository>,
    bots: Arc<dyn BotOwnership>,
    checker: Arc<BotHealthChecker>,
    logs: Arc<dyn HealthLogStore>,
    restarter: Arc<dyn RestartAction>,
    cron: croner::Cron,
    timezone: Tz,
}

impl SupervisorLoop {
    pub fn new(
        cron_expr: &str,
        timezone: Tz,
        state: Arc<dyn StateStore>,
        agents: Arc<dyn AdminAgentRepository>,
        tenants: Arc<dyn TenantRepository>,
        bots: Arc<dyn BotOwnership>,
        checker: Arc<BotHealthChecker>,
        logs: Arc<dyn HealthLogStore>,
        restarter: Arc<dyn RestartAction>,
    ) -> Result<Self, GatewayError> {
        let cron = croner::Cron::new(cron_expr)
            .parse()
            .map_err(|e| GatewayError::Configuration(format!("invalid cron expression: {e}")))?;
        Ok(Self { state, agents, tenants, bots, checker, logs, restarter, cron, timezone })
    }

    /// The next instant this loop's cron expression fires, after `after`.
    #[must_use]
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let after_tz = after.with_timezone(&self.timezone);
        self.cron.find_next_occurrence(&after_tz, false).ok().map(|dt| dt.with_timezone(&Utc))
    }

    /// Run a single tick: claim non-overlapping execution, fan out to every
    /// eligible tenant, and return each tenant's cycle result plus any
    /// alerts raised. Returns `None` (no results) if a concurrent tick
    /// already holds the claim.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Option<Vec<(TenantCycleResult, Vec<SupervisorAlert>)>>, GatewayError> {
        let claim_key = StateKey::global(KeyKind::SupervisorClaim, "tick");
        let claimed = self
            .state
            .check_and_set(&claim_key, &now.to_rfc3339(), Some(CLAIM_TTL))
            .await
            .map_err(|e| GatewayError::State(e.to_string()))?;
        if !claimed {
            info!("supervisor tick already running, skipping");
            return Ok(None);
        }

        let agents = self.agents.active_agents().await?;
        let mut by_tenant: HashMap<TenantId, Vec<AdminAgent>> = HashMap::new();
        for agent in agents {
            if agent.is_active() && agent.health_check_enabled {
                by_tenant.entry(agent.tenant_id.clone()).or_default().push(agent);
            }
        }

        let mut results = Vec::new();
        for (tenant_id, tenant_agents) in by_tenant {
            let Some(tenant) = self.tenants.get(&tenant_id).await? else {
                continue;
            };
            if !tenant.is_active() {
                continue;
            }
            results.push(self.run_tenant_cycle(&tenant_id, &tenant_agents).await);
        }
        Ok(Some(results))
    }

    async fn run_tenant_cycle(
        &self,
        tenant_id: &TenantId,
        agents: &[AdminAgent],
    ) -> (TenantCycleResult, Vec<SupervisorAlert>) {
        let started = std::time::Instant::now();
        let mut result = TenantCycleResult { tenant_id: tenant_id.to_string(), ..Default::default() };
        let mut alerts = Vec::new();

        for agent in agents {
            let bot_ids = match self.bots.bots_for_tenant(tenant_id).await {
                Ok(ids) => ids,
                Err(e) => {
                    result.error = Some(e.to_string());
                    continue;
                }
            };

            for bot_id in bot_ids {
                let prior = self.logs.recent(&bot_id, 1).await.ok().and_then(|mut v| v.pop());

                let outcome = match self.checker.check_bot_health(&bot_id).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(bot_id = %bot_id, error = %e, "health check failed");
                        result.error = Some(e.to_string());
                        continue;
                    }
                };

                match outcome.classification {
                    HealthClassification::Healthy => {
                        result.healthy += 1;
                        let recovered_from = matches!(
                            prior.as_ref().map(|p| p.classification),
                            Some(HealthClassification::Unhealthy) | Some(HealthClassification::Dead)
                        );
                        if recovered_from {
                            alerts.push(SupervisorAlert {
                                bot_id: bot_id.clone(),
                                alert_type: "BOT_RECOVERED",
                                severity: llmgate_core::AlertSeverity::Info,
                                title: format!("Bot {bot_id} recovered"),
                            });
                        }
                    }
                    HealthClassification::Degraded => {
                        result.degraded += 1;
                        let first_transition = !matches!(
                            prior.as_ref().map(|p| p.classification),
                            Some(HealthClassification::Degraded)
                        );
                        if first_transition {
                            alerts.push(SupervisorAlert {
                                bot_id: bot_id.clone(),
                                alert_type: "BOT_SLOW",
                                severity: llmgate_core::AlertSeverity::Warning,
                                title: format!("Bot {bot_id} is responding slowly"),
                            });
                        }
                    }
                    HealthClassification::Unhealthy | HealthClassification::Dead => {
                        if outcome.classification == HealthClassification::Unhealthy {
                            result.unhealthy += 1;
                        } else {
                            result.dead += 1;
                        }

                        if agent.auto_restart_enabled {
                            let action = self.attempt_restart(&bot_id, agent.max_restart_attempts).await;
                            let recovered = action.succeeded;
                            result.actions.push(action);
                            alerts.push(if recovered {
                                SupervisorAlert {
                                    bot_id: bot_id.clone(),
                                    alert_type: "BOT_RECOVERED",
                                    severity: llmgate_core::AlertSeverity::Info,
                                    title: format!("Bot {bot_id} recovered after restart"),
                                }
                            } else {
                                SupervisorAlert {
                                    bot_id: bot_id.clone(),
                                    alert_type: "BOT_DOWN",
                                    severity: llmgate_core::AlertSeverity::Critical,
                                    title: format!("Bot {bot_id} is down and could not be restarted"),
                                }
                            });
                        }
                    }
                }
            }
        }

        result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        (result, alerts)
    }

    async fn attempt_restart(&self, bot_id: &BotId, max_attempts: u32) -> TickAction {
        let mut last_error = None;
        for attempt in 1..=max_attempts.max(1) {
            match self.restarter.restart(bot_id).await {
                Ok(()) => {
                    return TickAction {
                        bot_id: bot_id.clone(),
                        description: format!("restarted on attempt {attempt}"),
                        succeeded: true,
                    };
                }
                Err(e) => last_error = Some(e),
            }
        }
        TickAction {
            bot_id: bot_id.clone(),
            description: format!(
                "restart failed after {max_attempts} attempts: {}",
                last_error.unwrap_or_default()
            ),
            succeeded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_core::{AdminAgentStatus, Bot};
    use llmgate_health::{BotProbe, BotRepository, NoopProbe};
    use llmgate_state_memory::MemoryStateStore;
    use llmgate_store::StateHealthLogStore;
    use std::sync::Mutex;

    struct FixedAgents(Vec<AdminAgent>);

    #[async_trait]
    impl AdminAgentRepository for FixedAgents {
        async fn active_agents(&self) -> Result<Vec<AdminAgent>, GatewayError> {
            Ok(self.0.clone())
        }
    }

    struct FixedTenants(Tenant);

    #[async_trait]
    impl TenantRepository for FixedTenants {
        async fn get(&self, _tenant_id: &TenantId) -> Result<Option<Tenant>, GatewayError> {
            Ok(Some(self.0.clone()))
        }
    }

    struct FixedBots(Vec<BotId>);

    #[async_trait]
    impl BotOwnership for FixedBots {
        async fn bots_for_tenant(&self, _tenant_id: &TenantId) -> Result<Vec<BotId>, GatewayError> {
            Ok(self.0.clone())
        }
    }

    struct FixedBotRepo(Bot);

    #[async_trait]
    impl BotRepository for FixedBotRepo {
        async fn get(&self, _bot_id: &BotId) -> Result<Option<Bot>, GatewayError> {
            Ok(Some(self.0.clone()))
        }
    }

    struct AlwaysFailingProbe;

    #[async_trait]
    impl BotProbe for AlwaysFailingProbe {
        async fn probe(&self, _bot: &Bot) -> Result<(), String> {
            Err("down".to_string())
        }
    }

    struct CountingRestarter {
        succeed_on_attempt: u32,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl RestartAction for CountingRestarter {
        async fn restart(&self, _bot_id: &BotId) -> Result<(), String> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls >= self.succeed_on_attempt {
                Ok(())
            } else {
                Err("still down".to_string())
            }
        }
    }

    fn tenant() -> Tenant {
        Tenant {
            id: TenantId::from("t1"),
            name: "Acme".into(),
            monthly_budget: rust_decimal::Decimal::new(10000, 2),
            daily_budget: None,
            limits: llmgate_core::TenantLimits::default(),
            allowed_agents: vec![],
            allowed_providers: vec![],
            suspended: false,
            suspend_on_exceed: false,
            deleted: false,
            alert_thresholds: llmgate_core::TenantAlertThresholds::default(),
            created_at: Utc::now(),
        }
    }

    fn agent() -> AdminAgent {
        AdminAgent {
            id: llmgate_core::AdminAgentId::from("aa-1"),
            tenant_id: TenantId::from("t1"),
            bot_id: BotId::from("bot-1"),
            status: AdminAgentStatus::Active,
            health_check_enabled: true,
            auto_restart_enabled: true,
            max_restart_attempts: 3,
            created_at: Utc::now(),
        }
    }

    fn bot() -> Bot {
        Bot {
            id: BotId::from("bot-1"),
            tenant_id: TenantId::from("t1"),
            name: "test".to_string(),
            enabled: true,
            check_interval_seconds: 60,
            degraded_latency_ms: 5000,
            dead_after_consecutive_unhealthy: 3,
            last_classification: None,
            last_checked_at: None,
        }
    }

    fn build_loop(
        probe: Arc<dyn BotProbe>,
        restarter: Arc<dyn RestartAction>,
        auto_restart: bool,
    ) -> SupervisorLoop {
        let logs: Arc<dyn HealthLogStore> = Arc::new(StateHealthLogStore::new(Arc::new(MemoryStateStore::new())));
        let checker = Arc::new(BotHealthChecker::new(Arc::new(FixedBotRepo(bot())), probe, logs.clone()));
        let mut a = agent();
        a.auto_restart_enabled = auto_restart;
        SupervisorLoop::new(
            "*/5 * * * *",
            chrono_tz::UTC,
            Arc::new(MemoryStateStore::new()),
            Arc::new(FixedAgents(vec![a])),
            Arc::new(FixedTenants(tenant())),
            Arc::new(FixedBots(vec![BotId::from("bot-1")])),
            checker,
            logs,
            restarter,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn healthy_bot_counted_and_no_alerts() {
        let sup = build_loop(Arc::new(NoopProbe), Arc::new(CountingRestarter { succeed_on_attempt: 1, calls: Mutex::new(0) }), false);
        let results = sup.tick(Utc::now()).await.unwrap().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.healthy, 1);
        assert!(results[0].1.is_empty());
    }

    #[tokio::test]
    async fn dead_bot_with_auto_restart_enabled_recovers() {
        let sup = build_loop(
            Arc::new(AlwaysFailingProbe),
            Arc::new(CountingRestarter { succeed_on_attempt: 2, calls: Mutex::new(0) }),
            true,
        );
        let results = sup.tick(Utc::now()).await.unwrap().unwrap();
        let (cycle, alerts) = &results[0];
        assert_eq!(cycle.unhealthy, 1);
        assert_eq!(cycle.actions.len(), 1);
        assert!(cycle.actions[0].succeeded);
        assert!(alerts.iter().any(|a| a.alert_type == "BOT_RECOVERED"));
    }

    #[tokio::test]
    async fn unrecoverable_bot_emits_bot_down() {
        let sup = build_loop(
            Arc::new(AlwaysFailingProbe),
            Arc::new(CountingRestarter { succeed_on_attempt: 99, calls: Mutex::new(0) }),
            true,
        );
        let results = sup.tick(Utc::now()).await.unwrap().unwrap();
        let (_, alerts) = &results[0];
        assert!(alerts.iter().any(|a| a.alert_type == "BOT_DOWN"));
    }

    #[tokio::test]
    async fn concurrent_tick_is_skipped() {
        let sup = build_loop(Arc::new(NoopProbe), Arc::new(CountingRestarter { succeed_on_attempt: 1, calls: Mutex::new(0) }), false);
        let now = Utc::now();
        let first = sup.tick(now).await.unwrap();
        assert!(first.is_some());
        let second = sup.tick(now).await.unwrap();
        assert!(second.is_none());
    }

    struct FailOnceProbe {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl BotProbe for FailOnceProbe {
        async fn probe(&self, _bot: &Bot) -> Result<(), String> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                Err("down".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn bot_is_restarted_then_recovers_on_the_next_tick() {
        let sup = build_loop(
            Arc::new(FailOnceProbe { calls: Mutex::new(0) }),
            Arc::new(CountingRestarter { succeed_on_attempt: 99, calls: Mutex::new(0) }),
            true,
        );

        let first_tick = Utc::now();
        let first = sup.tick(first_tick).await.unwrap().unwrap();
        let (cycle, alerts) = &first[0];
        assert_eq!(cycle.unhealthy, 1);
        assert_eq!(cycle.actions.len(), 1);
        assert!(!cycle.actions[0].succeeded);
        assert!(alerts
            .iter()
            .any(|a| a.alert_type == "BOT_DOWN" && a.severity == llmgate_core::AlertSeverity::Critical));

        let second_tick = first_tick + chrono::Duration::minutes(6);
        let second = sup.tick(second_tick).await.unwrap().unwrap();
        let (cycle, alerts) = &second[0];
        assert_eq!(cycle.healthy, 1);
        assert!(alerts
            .iter()
            .any(|a| a.alert_type == "BOT_RECOVERED" && a.severity == llmgate_core::AlertSeverity::Info));
    }

    #[test]
    fn next_occurrence_is_in_the_future() {
        let sup = build_loop(Arc::new(NoopProbe), Arc::new(CountingRestarter { succeed_on_attempt: 1, calls: Mutex::new(0) }), false);
        let now = Utc::now();
        let next = sup.next_occurrence(now).unwrap();
        assert!(next > now);
    }
}
