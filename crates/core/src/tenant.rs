use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, ProviderId, TenantId};

/// Budget-warning threshold levels, expressed as the fraction of budget
/// *remaining* at which an alert fires. Defaults match the four-tier scheme
/// from the data model: 20%/10%/5%/1% remaining.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TenantAlertThresholds(pub Vec<Decimal>);

impl Default for TenantAlertThresholds {
    fn default() -> Self {
        Self(vec![
            Decimal::new(20, 2),
            Decimal::new(10, 2),
            Decimal::new(5, 2),
            Decimal::new(1, 2),
        ])
    }
}

/// Per-tenant and per-agent rate limits. Any field left `None` falls back to
/// the gateway-wide default for that scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TenantLimits {
    pub requests_per_minute: Option<u32>,
    pub tokens_per_minute: Option<u64>,
    pub requests_per_day: Option<u32>,
}

/// A tenant of the gateway: a billable unit with its own budget, rate
/// limits and allowlisted calling agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// Total budget for the current calendar month, in the provider's
    /// billing currency.
    pub monthly_budget: Decimal,
    /// Optional hard daily spend cap, independent of the monthly budget.
    pub daily_budget: Option<Decimal>,
    #[serde(default)]
    pub limits: TenantLimits,
    /// Agent ids allowed to call on this tenant's behalf. An empty list
    /// means no allowlist restriction is enforced.
    #[serde(default)]
    pub allowed_agents: Vec<AgentId>,
    /// Provider ids this tenant may route to. An empty list means no
    /// allowlist restriction is enforced.
    #[serde(default)]
    pub allowed_providers: Vec<ProviderId>,
    /// Whether the tenant has been suspended by an operator. Suspension
    /// does not auto-clear on month rollover; only an explicit admin
    /// action resets it.
    #[serde(default)]
    pub suspended: bool,
    /// Whether crossing the monthly or daily budget should also set
    /// `suspended`, blocking further completions until an operator clears
    /// it.
    #[serde(default)]
    pub suspend_on_exceed: bool,
    /// Soft-delete flag. A deleted tenant is excluded from supervisor
    /// cycles; its usage records and audit logs are retained regardless.
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub alert_thresholds: TenantAlertThresholds,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Whether `agent` is permitted to call on this tenant's behalf. An
    /// empty allowlist permits every agent.
    #[must_use]
    pub fn allows_agent(&self, agent: &AgentId) -> bool {
        self.allowed_agents.is_empty() || self.allowed_agents.contains(agent)
    }

    /// Whether the supervisor loop should include this tenant in a cycle:
    /// not soft-deleted. (Distinct from `suspended`, which only blocks
    /// completion calls.)
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> Tenant {
        Tenant {
            id: TenantId::from("t1"),
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

    #[test]
    fn empty_allowlist_permits_any_agent() {
        let t = tenant();
        assert!(t.allows_agent(&AgentId::from("anything")));
    }

    #[test]
    fn non_empty_allowlist_restricts_agents() {
        let mut t = tenant();
        t.allowed_agents = vec![AgentId::from("agent-a")];
        assert!(t.allows_agent(&AgentId::from("agent-a")));
        assert!(!t.allows_agent(&AgentId::from("agent-b")));
    }

    #[test]
    fn default_thresholds_match_spec() {
        let thresholds = TenantAlertThresholds::default();
        assert_eq!(
            thresholds.0,
            vec![
                Decimal::new(20, 2),
                Decimal::new(10, 2),
                Decimal::new(5, 2),
                Decimal::new(1, 2),
            ]
        );
    }
}
