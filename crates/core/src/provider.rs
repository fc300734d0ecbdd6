use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::ProviderId;

/// The kind of upstream a provider represents. Vendor providers are called
/// through a metered HTTP API; subscription providers are backed by a
/// session-based credential pool (e.g. a browser-automated chat session)
/// with its own quota semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Vendor,
    Subscription,
}

/// Lifecycle status of a provider, mirrored onto the circuit breaker's state
/// for that provider: `CircuitOpen` is set by the breaker itself, the other
/// three are operator/router controlled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Active,
    Degraded,
    CircuitOpen,
    Disabled,
}

impl ProviderStatus {
    /// Whether the router should consider this provider a routing candidate
    /// at all. `Degraded` providers are still tried, just ranked behind
    /// `Active` ones.
    #[must_use]
    pub fn is_selectable(self) -> bool {
        matches!(self, ProviderStatus::Active | ProviderStatus::Degraded)
    }
}

/// Per-token cost rates for a provider/model, used to compute usage cost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostRates {
    pub input_cost_per_1k_tokens: Decimal,
    pub output_cost_per_1k_tokens: Decimal,
}

/// A configured LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    pub provider_type: ProviderType,
    /// Lower value tried first by the router.
    pub priority: u32,
    pub status: ProviderStatus,
    /// Max requests per minute across all of this provider's credentials.
    pub rate_limit_per_minute: u32,
    /// Max concurrent in-flight requests.
    pub max_concurrency: u32,
    pub cost_rates: CostRates,
    pub models: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_and_degraded_are_selectable() {
        assert!(ProviderStatus::Active.is_selectable());
        assert!(ProviderStatus::Degraded.is_selectable());
        assert!(!ProviderStatus::CircuitOpen.is_selectable());
        assert!(!ProviderStatus::Disabled.is_selectable());
    }
}
