use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};

/// Result of a compare-and-swap operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    Ok,
    Conflict {
        current_value: Option<String>,
        current_version: u64,
    },
}

/// Abstraction over the external record store assumed to be available to
/// the gateway: a typed store with atomic upsert, increment and
/// compare-and-swap, used for rate-limit counters, circuit breaker state,
/// credential quotas, and supervisor distributed claims.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Atomically set `key` to `value` only if it does not already exist.
    /// Returns `true` if this call created the key, `false` if it already
    /// existed. Used for distributed-claim coordination.
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError>;

    /// Get the value for a key. Returns `None` if not found or expired.
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError>;

    /// Set a value with an optional TTL, overwriting any previous value.
    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &StateKey) -> Result<bool, StateError>;

    /// Atomically increment a counter by `delta`, creating it at 0 first if
    /// absent. Returns the new value. Used for rate-limit and budget
    /// counters.
    async fn increment(
        &self,
        key: &StateKey,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StateError>;

    /// Compare-and-swap: update the value only if the current version
    /// matches `expected_version`. Used by the circuit breaker to avoid
    /// clobbering a concurrent state transition.
    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError>;

    /// Current version of a key, for callers that need to read-then-CAS.
    /// Returns `0` for a key that does not exist.
    async fn version(&self, key: &StateKey) -> Result<u64, StateError>;

    /// Scan all keys of a given kind within a tenant, optionally filtered
    /// to ids starting with `prefix`. Potentially expensive; used sparingly
    /// (analytics aggregation, admin listing).
    async fn scan_keys(
        &self,
        tenant: &str,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, StateError>;
}
