use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateError;

/// A held distributed lock. Dropping without an explicit release is
/// allowed — the lock expires after its TTL — but explicit release is
/// preferred so another holder does not wait out the full TTL.
#[async_trait]
pub trait LockGuard: Send + Sync {
    /// Extend the lock's TTL.
    async fn extend(&self, duration: Duration) -> Result<(), StateError>;

    /// Explicitly release the lock.
    async fn release(self: Box<Self>) -> Result<(), StateError>;

    /// Whether this guard still holds the lock.
    async fn is_held(&self) -> Result<bool, StateError>;
}

/// Trait for acquiring distributed locks, used by the circuit breaker to
/// serialize state transitions and by the supervisor loop to guard against
/// overlapping cycles across replicas.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to acquire a lock immediately. Returns `None` if already held.
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>, StateError>;

    /// Acquire a lock, waiting up to `timeout` for it to become available.
    async fn acquire(
        &self,
        name: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Box<dyn LockGuard>, StateError>;
}
