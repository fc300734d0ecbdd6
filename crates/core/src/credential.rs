use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{CredentialId, ProviderId};

/// Lifecycle status of a single credential within a provider's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    QuotaExhausted,
    Revoked,
}

/// A single credential (API key or subscription session) within a
/// provider's credential pool. The pool is ordered by `priority`, with
/// credentials flagged `emergency` held back until non-emergency credentials
/// are exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub provider_id: ProviderId,
    /// Lower value selected first.
    pub priority: u32,
    pub status: CredentialStatus,
    /// Only used as a last resort after all non-emergency credentials in
    /// the pool are exhausted or revoked.
    #[serde(default)]
    pub emergency: bool,
    /// Token/request quota allotted to this credential for the current
    /// period, if the credential has its own quota distinct from the
    /// provider's rate limit.
    pub quota_limit: Option<u64>,
    pub quota_used: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    /// Cost already attributed to this credential in the current period.
    pub cost_used: Decimal,
    /// When this credential last failed a call, used to deprioritize it in
    /// selection ordering even while it's still nominally active.
    #[serde(default)]
    pub last_error_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Whether this credential currently has headroom to be selected.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        if self.status != CredentialStatus::Active {
            return false;
        }
        match self.quota_limit {
            Some(limit) => self.quota_used < limit,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential {
            id: CredentialId::from("cred-1"),
            provider_id: ProviderId::from("openai"),
            priority: 0,
            status: CredentialStatus::Active,
            emergency: false,
            quota_limit: Some(100),
            quota_used: 0,
            last_used_at: None,
            cost_used: Decimal::ZERO,
            last_error_at: None,
        }
    }

    #[test]
    fn usable_when_active_and_under_quota() {
        assert!(credential().is_usable());
    }

    #[test]
    fn unusable_when_quota_exhausted() {
        let mut c = credential();
        c.quota_used = 100;
        assert!(!c.is_usable());
    }

    #[test]
    fn unusable_when_revoked() {
        let mut c = credential();
        c.status = CredentialStatus::Revoked;
        assert!(!c.is_usable());
    }

    #[test]
    fn unlimited_quota_always_usable_while_active() {
        let mut c = credential();
        c.quota_limit = None;
        c.quota_used = 1_000_000;
        assert!(c.is_usable());
    }
}
