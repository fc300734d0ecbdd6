//! In-process [`StateStore`] and [`DistributedLock`] implementation backed
//! by `dashmap`. Used as the default backend for the standalone server, the
//! CLI, and every other crate's tests.
//!
//! There is no cross-process coordination here — "distributed" lock and
//! claim semantics are honored only within a single process, which is
//! sufficient for a single gateway instance and for exercising the
//! concurrency contracts the real backend must uphold.

mod lock;
mod store;

pub use lock::MemoryDistributedLock;
pub use store::MemoryStateStore;
