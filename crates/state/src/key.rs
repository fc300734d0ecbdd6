use serde::{Deserialize, Serialize};

use llmgate_core::TenantId;

/// The kind of state being stored, used to namespace keys within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// A rate-limit or budget counter for one window.
    Counter,
    /// A mutual-exclusion lock record.
    Lock,
    /// Circuit breaker state for one provider.
    Circuit,
    /// Credential quota usage for one credential.
    CredentialQuota,
    /// A supervisor cycle's distributed-claim record.
    SupervisorClaim,
    /// A notification throttle fingerprint record.
    NotificationThrottle,
    Custom(String),
}

impl KeyKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Counter => "counter",
            Self::Lock => "lock",
            Self::Circuit => "circuit",
            Self::CredentialQuota => "credential_quota",
            Self::SupervisorClaim => "supervisor_claim",
            Self::NotificationThrottle => "notification_throttle",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key used to address an entry in the state store:
/// `tenant:kind:id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub tenant: TenantId,
    pub kind: KeyKind,
    pub id: String,
}

impl StateKey {
    #[must_use]
    pub fn new(tenant: impl Into<TenantId>, kind: KeyKind, id: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            kind,
            id: id.into(),
        }
    }

    /// A key scoped to no particular tenant, used for gateway-wide state
    /// such as provider circuit breakers or supervisor claims.
    #[must_use]
    pub fn global(kind: KeyKind, id: impl Into<String>) -> Self {
        Self::new(TenantId::from("_global"), kind, id)
    }

    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}:{}:{}", self.tenant, self.kind, self.id)
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}
