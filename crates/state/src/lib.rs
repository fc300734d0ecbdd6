//! Trait abstractions for the record store the gateway is built on: a
//! typed store with atomic upsert, increment and compare-and-swap
//! (`StateStore`), plus short-TTL distributed locks (`DistributedLock`)
//! used to serialize circuit breaker transitions and supervisor cycles.
//!
//! This crate defines contracts only. [`llmgate-state-memory`] is the
//! in-process implementation used by default and in tests.

pub mod error;
pub mod key;
pub mod lock;
pub mod store;

pub mod testing;

pub use error::StateError;
pub use key::{KeyKind, StateKey};
pub use lock::{DistributedLock, LockGuard};
pub use store::{CasResult, StateStore};

impl From<StateError> for llmgate_core::GatewayError {
    fn from(err: StateError) -> Self {
        llmgate_core::GatewayError::State(err.to_string())
    }
}
