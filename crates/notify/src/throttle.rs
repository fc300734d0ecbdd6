//! Notification dedup via a fingerprinted throttle store with a fixed TTL.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use llmgate_core::{AlertSeverity, AlertType, GatewayError};
use llmgate_state::{KeyKind, StateKey, StateStore};

/// How long a fingerprint suppresses repeat sends for.
pub const THROTTLE_TTL: Duration = Duration::from_secs(5 * 60);

/// Build the dedup fingerprint `(admin_agent_id, alert_type, severity,
/// bot_id|"system", title)`, joined into a single string key.
#[must_use]
pub fn fingerprint(
    admin_agent_id: &str,
    alert_type: AlertType,
    severity: AlertSeverity,
    bot_id: Option<&str>,
    title: &str,
) -> String {
    format!(
        "{admin_agent_id}:{alert_type:?}:{severity:?}:{}:{title}",
        bot_id.unwrap_or("system")
    )
}

pub struct NotificationThrottle {
    state: Arc<dyn StateStore>,
}

impl NotificationThrottle {
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self { state }
    }

    fn key(fingerprint: &str) -> StateKey {
        StateKey::global(KeyKind::NotificationThrottle, fingerprint)
    }

    /// Whether a send for this fingerprint happened within the last
    /// `THROTTLE_TTL` window.
    pub async fn is_throttled(&self, fingerprint: &str) -> Result<bool, GatewayError> {
        Ok(self.state.get(&Self::key(fingerprint)).await?.is_some())
    }

    /// Record that a send for this fingerprint just succeeded.
    pub async fn record_sent(&self, fingerprint: &str, now: DateTime<Utc>) -> Result<(), GatewayError> {
        self.state
            .set(&Self::key(fingerprint), &now.to_rfc3339(), Some(THROTTLE_TTL))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_state_memory::MemoryStateStore;

    #[tokio::test]
    async fn fresh_fingerprint_is_not_throttled() {
        let throttle = NotificationThrottle::new(Arc::new(MemoryStateStore::new()));
        assert!(!throttle.is_throttled("fp-1").await.unwrap());
    }

    #[tokio::test]
    async fn recorded_fingerprint_is_throttled_until_ttl_expires() {
        let throttle = NotificationThrottle::new(Arc::new(MemoryStateStore::new()));
        throttle.record_sent("fp-1", Utc::now()).await.unwrap();
        assert!(throttle.is_throttled("fp-1").await.unwrap());
    }

    #[test]
    fn fingerprint_defaults_bot_to_system() {
        let fp = fingerprint("aa-1", AlertType::BudgetWarning, AlertSeverity::Warning, None, "Budget warning");
        assert!(fp.contains("system"));
    }
}
