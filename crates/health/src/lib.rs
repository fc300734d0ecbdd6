//! Bot Health Checker: classifies a single bot's liveness on demand.
//!
//! The classification contract is fixed — four outcomes, fixed
//! preconditions, a latency measurement on every path — but the probe body
//! itself is pluggable: the MVP probe is a record-store round-trip, and a
//! concrete deployment swaps in a real liveness call against the bot's
//! channel via [`BotProbe`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use llmgate_core::{Bot, BotHealthLog, BotId, GatewayError, HealthClassification};
use llmgate_store::HealthLogStore;
use uuid::Uuid;

/// Looks up bots by id. A thin seam so the health checker doesn't depend on
/// a concrete repository.
#[async_trait]
pub trait BotRepository: Send + Sync {
    async fn get(&self, bot_id: &BotId) -> Result<Option<Bot>, GatewayError>;
}

/// A liveness probe against a bot's channel. Returns `Ok(())` on a
/// reachable bot or `Err` with a human-readable failure detail.
#[async_trait]
pub trait BotProbe: Send + Sync {
    async fn probe(&self, bot: &Bot) -> Result<(), String>;
}

/// Minimal record-store round-trip probe: always succeeds. Stands in for a
/// real liveness call until one is wired in.
pub struct NoopProbe;

#[async_trait]
impl BotProbe for NoopProbe {
    async fn probe(&self, _bot: &Bot) -> Result<(), String> {
        Ok(())
    }
}

/// Outcome of a single `check_bot_health` call.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub bot_id: BotId,
    pub classification: HealthClassification,
    pub latency_ms: u64,
    pub detail: Option<String>,
}

pub struct BotHealthChecker {
    bots: Arc<dyn BotRepository>,
    probe: Arc<dyn BotProbe>,
    logs: Arc<dyn HealthLogStore>,
}

impl BotHealthChecker {
    #[must_use]
    pub fn new(bots: Arc<dyn BotRepository>, probe: Arc<dyn BotProbe>, logs: Arc<dyn HealthLogStore>) -> Self {
        Self { bots, probe, logs }
    }

    /// Classify a bot's current liveness, per the fixed four-outcome
    /// contract, and append the result to the health log.
    pub async fn check_bot_health(&self, bot_id: &BotId) -> Result<HealthCheckResult, GatewayError> {
        let Some(bot) = self.bots.get(bot_id).await? else {
            let result = HealthCheckResult {
                bot_id: bot_id.clone(),
                classification: HealthClassification::Dead,
                latency_ms: 0,
                detail: Some("bot-not-found".to_string()),
            };
            self.record(&result).await?;
            return Ok(result);
        };

        if !bot.enabled {
            let result = HealthCheckResult {
                bot_id: bot_id.clone(),
                classification: HealthClassification::Dead,
                latency_ms: 0,
                detail: Some("bot-disabled".to_string()),
            };
            self.record(&result).await?;
            return Ok(result);
        }

        let started = Instant::now();
        let probe_result = self.probe.probe(&bot).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match probe_result {
            Err(detail) => HealthCheckResult {
                bot_id: bot_id.clone(),
                classification: HealthClassification::Unhealthy,
                latency_ms,
                detail: Some(detail),
            },
            Ok(()) if latency_ms > bot.degraded_latency_ms => HealthCheckResult {
                bot_id: bot_id.clone(),
                classification: HealthClassification::Degraded,
                latency_ms,
                detail: None,
            },
            Ok(()) => HealthCheckResult {
                bot_id: bot_id.clone(),
                classification: HealthClassification::Healthy,
                latency_ms,
                detail: None,
            },
        };

        self.record(&result).await?;
        Ok(result)
    }

    async fn record(&self, result: &HealthCheckResult) -> Result<(), GatewayError> {
        let log = BotHealthLog {
            id: Uuid::new_v4(),
            bot_id: result.bot_id.clone(),
            classification: result.classification,
            latency_ms: Some(result.latency_ms),
            detail: result.detail.clone(),
            checked_at: chrono::Utc::now(),
        };
        self.logs.record(log).await.map_err(|e| GatewayError::State(e.to_string()))
    }
}
