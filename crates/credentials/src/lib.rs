//! Credential pool: selects the best usable credential for a provider and
//! tracks quota/cost usage against it.
//!
//! Selection order within the non-emergency set: remaining credits
//! descending, usage-percentage ascending, no-recent-error first, then
//! lowest `priority`. Emergency credentials are held back until every
//! non-emergency credential is exhausted or revoked, and are only
//! considered at all when the caller opts in via `exclude_emergency`.
//! Usage updates are serialized per credential through a short-TTL
//! [`DistributedLock`] so two concurrent calls never both think they
//! reserved the last unit of quota.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use llmgate_core::{AlertSeverity, Credential, CredentialId, CredentialStatus, GatewayError, ProviderId};
use llmgate_state::{DistributedLock, KeyKind, StateKey, StateStore};
use rust_decimal::Decimal;
use tracing::warn;

const MUTATION_LOCK_TTL: Duration = Duration::from_secs(5);

/// A credential is no longer considered "recently failed" once this much
/// time has passed since its last recorded error.
const RECENT_ERROR_WINDOW: chrono::Duration = chrono::Duration::minutes(5);

/// An alert raised when an emergency credential is activated (or when none
/// is available to activate), handed to the caller for notification
/// dispatch — this manager does not own dispatch, matching the supervisor
/// loop's alert contract.
#[derive(Debug, Clone)]
pub struct CredentialAlert {
    pub provider_id: ProviderId,
    pub credential_id: Option<CredentialId>,
    pub alert_type: &'static str,
    pub severity: AlertSeverity,
    pub title: String,
}

/// Source of truth for a provider's credential pool. A minimal in-memory
/// listing is provided via [`StaticCredentialPool`]; a real deployment
/// would back this with the external record store.
pub trait CredentialSource: Send + Sync {
    fn credentials_for(&self, provider_id: &ProviderId) -> Vec<Credential>;
}

/// A fixed, admin-configured set of credentials per provider.
#[derive(Default)]
pub struct StaticCredentialPool {
    by_provider: dashmap::DashMap<ProviderId, Vec<Credential>>,
}

impl StaticCredentialPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_credentials(&self, provider_id: ProviderId, credentials: Vec<Credential>) {
        self.by_provider.insert(provider_id, credentials);
    }
}

impl CredentialSource for StaticCredentialPool {
    fn credentials_for(&self, provider_id: &ProviderId) -> Vec<Credential> {
        self.by_provider
            .get(provider_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

/// Selects and tracks usage of credentials within a provider's pool.
pub struct CredentialPoolManager {
    source: Arc<dyn CredentialSource>,
    state: Arc<dyn StateStore>,
    lock: Arc<dyn DistributedLock>,
}

impl CredentialPoolManager {
    #[must_use]
    pub fn new(source: Arc<dyn CredentialSource>, state: Arc<dyn StateStore>, lock: Arc<dyn DistributedLock>) -> Self {
        Self { source, state, lock }
    }

    fn quota_key(&self, credential_id: &CredentialId) -> StateKey {
        StateKey::global(KeyKind::CredentialQuota, credential_id.as_str())
    }

    fn error_key(&self, credential_id: &CredentialId) -> StateKey {
        StateKey::global(KeyKind::Custom("credential_error".to_string()), credential_id.as_str())
    }

    async fn load_quota_used(&self, credential_id: &CredentialId) -> u64 {
        match self.state.get(&self.quota_key(credential_id)).await {
            Ok(Some(v)) => v.parse().unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                warn!(error = %e, "failed to load credential quota, assuming zero usage");
                0
            }
        }
    }

    async fn load_last_error_at(&self, credential_id: &CredentialId) -> Option<DateTime<Utc>> {
        match self.state.get(&self.error_key(credential_id)).await {
            Ok(Some(v)) => DateTime::parse_from_rfc3339(&v).ok().map(|dt| dt.with_timezone(&Utc)),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "failed to load credential error timestamp, assuming none");
                None
            }
        }
    }

    /// Load the persisted quota/error state onto each candidate, the
    /// source only carries the static, admin-configured shape.
    async fn hydrate(&self, candidates: Vec<Credential>) -> Vec<Credential> {
        let mut hydrated = Vec::with_capacity(candidates.len());
        for mut candidate in candidates {
            candidate.quota_used = self.load_quota_used(&candidate.id).await;
            candidate.last_error_at = self.load_last_error_at(&candidate.id).await;
            hydrated.push(candidate);
        }
        hydrated
    }

    /// Select the best usable credential for a provider.
    ///
    /// Restricts to active, non-emergency credentials by default; pass
    /// `exclude_emergency = false` to allow falling back to the
    /// least-used emergency credential once every non-emergency candidate
    /// is exhausted or revoked. Returns the selected credential alongside
    /// an [`CredentialAlert`] whenever an emergency credential was
    /// activated (or none was available to activate).
    pub async fn select_best(
        &self,
        provider_id: &ProviderId,
        exclude_emergency: bool,
    ) -> (Result<Credential, GatewayError>, Option<CredentialAlert>) {
        let candidates = self.source.credentials_for(provider_id);
        if candidates.is_empty() {
            return (Err(GatewayError::NoUsableCredential(provider_id.clone())), None);
        }

        let regular: Vec<Credential> = candidates.iter().filter(|c| !c.emergency).cloned().collect();
        let mut regular = self.hydrate(regular).await;
        sort_candidates(&mut regular);
        if let Some(credential) = regular.into_iter().find(Credential::is_usable) {
            return (Ok(credential), None);
        }

        if exclude_emergency {
            return (Err(GatewayError::NoUsableCredential(provider_id.clone())), None);
        }

        let emergency: Vec<Credential> = candidates.iter().filter(|c| c.emergency).cloned().collect();
        let mut emergency = self.hydrate(emergency).await;
        sort_candidates(&mut emergency);

        if let Some(mut credential) = emergency.into_iter().find(|c| c.status != CredentialStatus::Revoked) {
            credential.status = CredentialStatus::Active;
            let alert = CredentialAlert {
                provider_id: provider_id.clone(),
                credential_id: Some(credential.id.clone()),
                alert_type: "emergency-activation",
                severity: AlertSeverity::Info,
                title: format!("Emergency credential {} activated for provider {provider_id}", credential.id),
            };
            return (Ok(credential), Some(alert));
        }

        let alert = CredentialAlert {
            provider_id: provider_id.clone(),
            credential_id: None,
            alert_type: "emergency-activation",
            severity: AlertSeverity::Critical,
            title: format!("No emergency credential available for provider {provider_id}"),
        };
        (Err(GatewayError::NoUsableCredential(provider_id.clone())), Some(alert))
    }

    /// Record usage against a credential after a completed call, under a
    /// short mutation lock so two racing updates cannot both read the same
    /// stale `quota_used` value. `success` tracks the call outcome so a
    /// recently-failing credential falls to the back of the selection
    /// order without having to be revoked outright.
    pub async fn update_usage(&self, credential_id: &CredentialId, token_delta: u64, success: bool) -> Result<(), GatewayError> {
        let lock_name = format!("cred:{credential_id}");
        let guard = self
            .lock
            .try_acquire(&lock_name, MUTATION_LOCK_TTL)
            .await?
            .ok_or_else(|| GatewayError::LockFailed(lock_name.clone()))?;

        let key = self.quota_key(credential_id);
        #[allow(clippy::cast_possible_wrap)]
        self.state.increment(&key, token_delta as i64, None).await?;

        if !success {
            self.state.set(&self.error_key(credential_id), &Utc::now().to_rfc3339(), None).await?;
        }

        guard.release().await?;
        Ok(())
    }

    /// Reset a credential's quota counter, used by the monthly/daily reset
    /// job or by an operator action.
    pub async fn reset_quota(&self, credential_id: &CredentialId) -> Result<(), GatewayError> {
        self.state.delete(&self.quota_key(credential_id)).await?;
        Ok(())
    }
}

/// Remaining quota, highest first; an unlimited credential has no ceiling
/// so it sorts ahead of any limited one.
fn remaining_credits(c: &Credential) -> u64 {
    match c.quota_limit {
        Some(limit) => limit.saturating_sub(c.quota_used),
        None => u64::MAX,
    }
}

/// Fraction of quota already consumed; unlimited credentials count as 0%
/// used so they never lose to a limited credential on this criterion.
fn usage_percentage(c: &Credential) -> Decimal {
    match c.quota_limit {
        Some(limit) if limit > 0 => Decimal::from(c.quota_used) / Decimal::from(limit),
        _ => Decimal::ZERO,
    }
}

fn has_recent_error(c: &Credential, now: DateTime<Utc>) -> bool {
    c.last_error_at.is_some_and(|at| now - at < RECENT_ERROR_WINDOW)
}

/// Order candidates by remaining credits descending, usage-percentage
/// ascending, no-recent-error first, then priority ascending.
fn sort_candidates(candidates: &mut [Credential]) {
    let now = Utc::now();
    candidates.sort_by(|a, b| {
        remaining_credits(b)
            .cmp(&remaining_credits(a))
            .then_with(|| usage_percentage(a).cmp(&usage_percentage(b)))
            .then_with(|| has_recent_error(a, now).cmp(&has_recent_error(b, now)))
            .then_with(|| a.priority.cmp(&b.priority))
    });
}

/// Whether a credential's status should be considered revoked as of `now`
/// — present for symmetry with the provider/bot status model; credentials
/// do not expire on a schedule in this data model, only by explicit
/// revocation.
#[must_use]
pub fn is_revoked(credential: &Credential, _now: chrono::DateTime<Utc>) -> bool {
    credential.status == CredentialStatus::Revoked
}
