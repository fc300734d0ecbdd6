use thiserror::Error;

/// Errors returned by a [`crate::store::StateStore`] or
/// [`crate::lock::DistributedLock`] implementation.
#[derive(Debug, Error)]
pub enum StateError {
    /// The backend is temporarily unavailable (connection refused, timeout).
    #[error("state backend unavailable: {0}")]
    Unavailable(String),

    /// A compare-and-swap or lock operation hit a version/ownership
    /// conflict that the caller should treat as a normal contention
    /// outcome, not a hard error.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A lock could not be acquired within its requested timeout.
    #[error("lock acquisition timed out after waiting for {0:?}")]
    LockTimeout(std::time::Duration),

    /// The stored value could not be decoded as the type the caller
    /// expected.
    #[error("corrupt state value at {key}: {message}")]
    Corrupt { key: String, message: String },

    /// Any other backend-specific failure.
    #[error("state store error: {0}")]
    Backend(String),
}
