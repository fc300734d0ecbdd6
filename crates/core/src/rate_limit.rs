use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, ProviderId, TenantId};

/// The scope a rate limit or budget counter applies to. Formats as the
/// `tenant:<id>` / `agent:<id>` / `provider:<id>` key shape used to namespace
/// counters in the state store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateLimitKey {
    Tenant(TenantId),
    Agent(AgentId),
    Provider(ProviderId),
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitKey::Tenant(id) => write!(f, "tenant:{id}"),
            RateLimitKey::Agent(id) => write!(f, "agent:{id}"),
            RateLimitKey::Provider(id) => write!(f, "provider:{id}"),
        }
    }
}

/// A single counter entry for one scope within one 60-second window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RateLimitEntry {
    pub request_count: u64,
    pub token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display_matches_spec_format() {
        assert_eq!(
            RateLimitKey::Tenant(TenantId::from("t1")).to_string(),
            "tenant:t1"
        );
        assert_eq!(
            RateLimitKey::Agent(AgentId::from("a1")).to_string(),
            "agent:a1"
        );
        assert_eq!(
            RateLimitKey::Provider(ProviderId::from("p1")).to_string(),
            "provider:p1"
        );
    }
}
