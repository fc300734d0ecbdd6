use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{AdminAgentId, BotId, TenantId};

/// Outcome of a single liveness probe against a bot, classified into four
/// buckets. This is a classification contract, not a concrete probe
/// mechanism: how a probe response maps to a classification is left to the
/// health checker's implementation, not encoded here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthClassification {
    Healthy,
    Degraded,
    Unhealthy,
    Dead,
}

/// A bot tracked by the health checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: BotId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Whether the bot is enabled; a disabled bot is always classified
    /// `Dead` without a probe.
    pub enabled: bool,
    /// How often, in seconds, the health checker should probe this bot.
    pub check_interval_seconds: u64,
    /// Response latency, in milliseconds, above which a `Healthy` probe is
    /// downgraded to `Degraded`. Defaults to 5000ms per the health
    /// checker's classification rule.
    pub degraded_latency_ms: u64,
    /// Number of consecutive `Unhealthy` probes before the bot is
    /// classified `Dead` and becomes eligible for auto-heal.
    pub dead_after_consecutive_unhealthy: u32,
    pub last_classification: Option<HealthClassification>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Default for Bot {
    fn default() -> Self {
        Self {
            id: BotId::from(Uuid::new_v4().to_string()),
            tenant_id: TenantId::from(Uuid::new_v4().to_string()),
            name: String::new(),
            enabled: true,
            check_interval_seconds: 60,
            degraded_latency_ms: 5000,
            dead_after_consecutive_unhealthy: 3,
            last_classification: None,
            last_checked_at: None,
        }
    }
}

/// A single probe result recorded for a bot, used both for the health
/// checker's consecutive-failure counting and for operator-facing history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotHealthLog {
    pub id: Uuid,
    pub bot_id: BotId,
    pub classification: HealthClassification,
    pub latency_ms: Option<u64>,
    pub detail: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Lifecycle status of an admin agent managed by the supervisor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAgentStatus {
    Active,
    Paused,
    Disabled,
}

/// An admin agent: a bot bound to a tenant that the supervisor loop fans
/// out to on each cycle, health-checks, and auto-heals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAgent {
    pub id: AdminAgentId,
    pub tenant_id: TenantId,
    pub bot_id: BotId,
    pub status: AdminAgentStatus,
    /// Whether the supervisor loop should health-check this agent's bot.
    pub health_check_enabled: bool,
    /// Whether the supervisor loop should attempt to restart a dead or
    /// unhealthy bot.
    pub auto_restart_enabled: bool,
    /// Upper bound on restart attempts in a single supervisor cycle.
    pub max_restart_attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl AdminAgent {
    /// Whether the supervisor loop should include this agent in a cycle.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AdminAgentStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bot_uses_spec_defaults() {
        let bot = Bot::default();
        assert_eq!(bot.degraded_latency_ms, 5000);
    }

    #[test]
    fn only_active_admin_agents_are_included_in_a_cycle() {
        let mut agent = AdminAgent {
            id: AdminAgentId::from("aa-1"),
            tenant_id: TenantId::from("t-1"),
            bot_id: BotId::from("bot-1"),
            status: AdminAgentStatus::Active,
            health_check_enabled: true,
            auto_restart_enabled: false,
            max_restart_attempts: 3,
            created_at: Utc::now(),
        };
        assert!(agent.is_active());
        agent.status = AdminAgentStatus::Paused;
        assert!(!agent.is_active());
    }
}
