//! Circuit breaker for provider dispatch.
//!
//! State is persisted in a [`StateStore`] so multiple gateway instances
//! share the same view of a provider's health, and mutations are
//! serialized through a short-TTL [`DistributedLock`] to avoid lost
//! updates. In `HalfOpen` state, only one probe request is admitted at a
//! time; a probe that never reports back is reclaimed as stale after
//! `half_open_timeout`.
//!
//! - `Closed` -> `Open` when consecutive failures reach `failure_threshold`.
//! - `Open` -> `HalfOpen` once `open_timeout` has elapsed since the last
//!   failure.
//! - `HalfOpen` -> `Closed` after `success_threshold` consecutive successes.
//! - `HalfOpen` -> `Open` on any failure during the probe.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use llmgate_core::ProviderId;
use llmgate_state::{DistributedLock, KeyKind, StateKey, StateStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// TTL for the short-lived distributed mutation lock guarding a single
/// breaker's state transitions.
const MUTATION_LOCK_TTL: Duration = Duration::from_secs(5);

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for a single provider's circuit breaker. Defaults match
/// the data model: 5 consecutive failures to open, 3 consecutive
/// successes to close, a 60s open timeout, and a 30s half-open probe
/// timeout.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout: Duration,
    /// How long a half-open probe may stay in flight before it is
    /// considered stale and the slot is reclaimed for a new probe.
    pub half_open_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold < 1 {
            return Err("failure_threshold must be >= 1".into());
        }
        if self.success_threshold < 1 {
            return Err("success_threshold must be >= 1".into());
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            open_timeout: Duration::from_secs(60),
            half_open_timeout: Duration::from_secs(30),
        }
    }
}

/// Mutable breaker state, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CircuitData {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    #[serde(default)]
    last_failure_time_ms: Option<i64>,
    #[serde(default)]
    probe_started_at_ms: Option<i64>,
}

impl Default for CircuitData {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_time_ms: None,
            probe_started_at_ms: None,
        }
    }
}

/// Circuit breaker for a single provider.
pub struct CircuitBreaker {
    provider: ProviderId,
    config: CircuitBreakerConfig,
    store: Arc<dyn StateStore>,
    lock: Arc<dyn DistributedLock>,
}

impl CircuitBreaker {
    fn new(
        provider: ProviderId,
        config: CircuitBreakerConfig,
        store: Arc<dyn StateStore>,
        lock: Arc<dyn DistributedLock>,
    ) -> Self {
        Self {
            provider,
            config,
            store,
            lock,
        }
    }

    fn state_key(&self) -> StateKey {
        StateKey::global(KeyKind::Circuit, self.provider.as_str())
    }

    fn lock_name(&self) -> String {
        format!("cb:{}", self.provider)
    }

    /// Fail-open: a store read error is treated as `Closed`, the same as a
    /// missing key, so a flaky state backend never itself takes a healthy
    /// provider out of rotation.
    async fn load_state(&self) -> CircuitData {
        match self.store.get(&self.state_key()).await {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_default(),
            Ok(None) => CircuitData::default(),
            Err(e) => {
                warn!(provider = %self.provider, error = %e, "failed to load circuit breaker state, defaulting to closed");
                CircuitData::default()
            }
        }
    }

    async fn save_state(&self, data: &CircuitData) {
        let Ok(json) = serde_json::to_string(data) else {
            warn!(provider = %self.provider, "failed to serialize circuit breaker state");
            return;
        };
        if let Err(e) = self.store.set(&self.state_key(), &json, None).await {
            warn!(provider = %self.provider, error = %e, "failed to save circuit breaker state");
        }
    }

    async fn acquire_mutation_lock(&self) -> Option<Box<dyn llmgate_state::LockGuard>> {
        match self.lock.try_acquire(&self.lock_name(), MUTATION_LOCK_TTL).await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(provider = %self.provider, error = %e, "failed to acquire circuit breaker mutation lock");
                None
            }
        }
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn is_probe_active(&self, data: &CircuitData) -> bool {
        data.probe_started_at_ms.is_some_and(|t| {
            #[allow(clippy::cast_possible_truncation)]
            let timeout_ms = self.config.half_open_timeout.as_millis() as i64;
            (Self::now_ms() - t) < timeout_ms
        })
    }

    /// Acquire permission to send a request through this breaker, applying
    /// the open -> half-open recovery transition if due.
    ///
    /// In `HalfOpen`, this reserves the single probe slot; the caller must
    /// follow up with [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure) to release it.
    pub async fn try_acquire_permit(&self) -> (CircuitState, Option<(CircuitState, CircuitState)>) {
        let Some(guard) = self.acquire_mutation_lock().await else {
            let data = self.load_state().await;
            if data.state == CircuitState::HalfOpen {
                return (CircuitState::Open, None);
            }
            return (data.state, None);
        };

        let mut data = self.load_state().await;
        let result = match data.state {
            CircuitState::Open => {
                let now = Self::now_ms();
                let elapsed_ms = data.last_failure_time_ms.map_or(i64::MAX, |t| (now - t).max(0));
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = self.config.open_timeout.as_millis() as i64;

                if elapsed_ms >= timeout_ms {
                    debug!(provider = %self.provider, "circuit transitioning open -> half_open");
                    data.state = CircuitState::HalfOpen;
                    data.consecutive_successes = 0;
                    data.probe_started_at_ms = Some(now);
                    self.save_state(&data).await;
                    (CircuitState::HalfOpen, Some((CircuitState::Open, CircuitState::HalfOpen)))
                } else {
                    (CircuitState::Open, None)
                }
            }
            CircuitState::HalfOpen => {
                if self.is_probe_active(&data) {
                    (CircuitState::Open, None)
                } else {
                    data.probe_started_at_ms = Some(Self::now_ms());
                    self.save_state(&data).await;
                    (CircuitState::HalfOpen, None)
                }
            }
            CircuitState::Closed => (CircuitState::Closed, None),
        };

        let _ = guard.release().await;
        result
    }

    /// Record a successful call. Returns `Some((from, to))` on transition.
    pub async fn record_success(&self) -> Option<(CircuitState, CircuitState)> {
        let guard = self.acquire_mutation_lock().await?;
        let mut data = self.load_state().await;

        let transition = match data.state {
            CircuitState::HalfOpen => {
                data.consecutive_successes += 1;
                data.probe_started_at_ms = None;
                if data.consecutive_successes >= self.config.success_threshold {
                    info!(provider = %self.provider, "circuit closing after successful probes");
                    data.state = CircuitState::Closed;
                    data.consecutive_failures = 0;
                    data.consecutive_successes = 0;
                    self.save_state(&data).await;
                    Some((CircuitState::HalfOpen, CircuitState::Closed))
                } else {
                    self.save_state(&data).await;
                    None
                }
            }
            CircuitState::Closed => {
                if data.consecutive_failures > 0 {
                    data.consecutive_failures = 0;
                    self.save_state(&data).await;
                }
                None
            }
            CircuitState::Open => None,
        };

        let _ = guard.release().await;
        transition
    }

    /// Record a failed call. Returns `Some((from, to))` on transition.
    pub async fn record_failure(&self) -> Option<(CircuitState, CircuitState)> {
        let guard = self.acquire_mutation_lock().await?;
        let mut data = self.load_state().await;
        let now = Self::now_ms();

        let transition = match data.state {
            CircuitState::Closed => {
                data.consecutive_failures += 1;
                data.last_failure_time_ms = Some(now);
                let transition = if data.consecutive_failures >= self.config.failure_threshold {
                    info!(provider = %self.provider, failures = data.consecutive_failures, "circuit opening");
                    data.state = CircuitState::Open;
                    Some((CircuitState::Closed, CircuitState::Open))
                } else {
                    None
                };
                self.save_state(&data).await;
                transition
            }
            CircuitState::HalfOpen => {
                info!(provider = %self.provider, "circuit re-opening after failed probe");
                data.state = CircuitState::Open;
                data.last_failure_time_ms = Some(now);
                data.consecutive_successes = 0;
                data.probe_started_at_ms = None;
                self.save_state(&data).await;
                Some((CircuitState::HalfOpen, CircuitState::Open))
            }
            CircuitState::Open => {
                data.last_failure_time_ms = Some(now);
                self.save_state(&data).await;
                None
            }
        };

        let _ = guard.release().await;
        transition
    }

    pub async fn state(&self) -> CircuitState {
        self.load_state().await.state
    }

    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    #[must_use]
    pub fn provider_id(&self) -> &ProviderId {
        &self.provider
    }

    /// Force the breaker back to `Closed`, used by the admin API's
    /// circuit-reset endpoint.
    pub async fn reset(&self) {
        if let Some(guard) = self.acquire_mutation_lock().await {
            self.save_state(&CircuitData::default()).await;
            let _ = guard.release().await;
        }
    }

    /// Force the breaker to `Open`, used by the admin API's circuit-trip
    /// endpoint.
    pub async fn trip(&self) {
        if let Some(guard) = self.acquire_mutation_lock().await {
            let mut data = self.load_state().await;
            data.state = CircuitState::Open;
            data.last_failure_time_ms = Some(Self::now_ms());
            self.save_state(&data).await;
            let _ = guard.release().await;
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("provider", &self.provider)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Registry of circuit breakers, one per provider, built at startup and
/// used immutably thereafter — each [`CircuitBreaker`] manages its own
/// mutation through the shared store and lock.
pub struct CircuitBreakerRegistry {
    breakers: HashMap<ProviderId, CircuitBreaker>,
    store: Arc<dyn StateStore>,
    lock: Arc<dyn DistributedLock>,
}

impl CircuitBreakerRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, lock: Arc<dyn DistributedLock>) -> Self {
        Self {
            breakers: HashMap::new(),
            store,
            lock,
        }
    }

    pub fn register(&mut self, provider: ProviderId, config: CircuitBreakerConfig) {
        self.breakers.insert(
            provider.clone(),
            CircuitBreaker::new(provider, config, Arc::clone(&self.store), Arc::clone(&self.lock)),
        );
    }

    #[must_use]
    pub fn get(&self, provider: &ProviderId) -> Option<&CircuitBreaker> {
        self.breakers.get(provider)
    }

    #[must_use]
    pub fn providers(&self) -> Vec<&ProviderId> {
        let mut ids: Vec<&ProviderId> = self.breakers.keys().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_state_memory::{MemoryDistributedLock, MemoryStateStore};

    fn breaker(config: CircuitBreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new(
            ProviderId::from("test-provider"),
            config,
            Arc::new(MemoryStateStore::new()),
            Arc::new(MemoryDistributedLock::new()),
        )
    }

    #[tokio::test]
    async fn starts_closed() {
        let cb = breaker(CircuitBreakerConfig::default());
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });
        assert!(cb.record_failure().await.is_none());
        assert!(cb.record_failure().await.is_none());
        assert_eq!(
            cb.record_failure().await,
            Some((CircuitState::Closed, CircuitState::Open))
        );
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failures_while_closed() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });
        cb.record_failure().await;
        cb.record_failure().await;
        cb.record_success().await;
        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_circuit_rejects_permits_before_timeout() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            open_timeout: Duration::from_secs(60),
            ..Default::default()
        });
        cb.record_failure().await;
        let (state, transition) = cb.try_acquire_permit().await;
        assert_eq!(state, CircuitState::Open);
        assert!(transition.is_none());
    }

    #[tokio::test]
    async fn transitions_to_half_open_after_timeout_elapses() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            open_timeout: Duration::from_millis(1),
            ..Default::default()
        });
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let (state, transition) = cb.try_acquire_permit().await;
        assert_eq!(state, CircuitState::HalfOpen);
        assert_eq!(transition, Some((CircuitState::Open, CircuitState::HalfOpen)));
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            open_timeout: Duration::from_millis(1),
            ..Default::default()
        });
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cb.try_acquire_permit().await;
        assert!(cb.record_success().await.is_none());
        assert_eq!(
            cb.record_success().await,
            Some((CircuitState::HalfOpen, CircuitState::Closed))
        );
    }

    #[tokio::test]
    async fn half_open_reopens_on_failure() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            open_timeout: Duration::from_millis(1),
            ..Default::default()
        });
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cb.try_acquire_permit().await;
        assert_eq!(
            cb.record_failure().await,
            Some((CircuitState::HalfOpen, CircuitState::Open))
        );
    }

    #[tokio::test]
    async fn half_open_only_admits_one_probe_at_a_time() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            open_timeout: Duration::from_millis(1),
            ..Default::default()
        });
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let (first, _) = cb.try_acquire_permit().await;
        assert_eq!(first, CircuitState::HalfOpen);
        let (second, _) = cb.try_acquire_permit().await;
        assert_eq!(second, CircuitState::Open, "second concurrent probe must be rejected");
    }

    #[tokio::test]
    async fn reset_forces_closed() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        cb.record_failure().await;
        cb.reset().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn trip_forces_open() {
        let cb = breaker(CircuitBreakerConfig::default());
        cb.trip().await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[test]
    fn validate_rejects_zero_thresholds() {
        let config = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
