//! Conformance test suites for [`StateStore`] and [`DistributedLock`]
//! backends. Call these from a backend crate's own test module against a
//! fresh instance, rather than duplicating the assertions per backend.

use std::time::Duration;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};
use crate::lock::DistributedLock;
use crate::store::{CasResult, StateStore};

fn test_key(kind: KeyKind, id: &str) -> StateKey {
    StateKey::new("test-tenant", kind, id)
}

/// Run the full state store conformance suite.
///
/// # Errors
///
/// Returns the first conformance failure encountered.
pub async fn run_store_conformance_tests(store: &dyn StateStore) -> Result<(), StateError> {
    test_get_missing(store).await?;
    test_set_and_get(store).await?;
    test_check_and_set_new(store).await?;
    test_check_and_set_existing(store).await?;
    test_delete(store).await?;
    test_increment(store).await?;
    test_compare_and_swap(store).await?;
    test_ttl_set(store).await?;
    test_scan_keys(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Counter, "missing");
    assert!(store.get(&key).await?.is_none());
    Ok(())
}

async fn test_set_and_get(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Counter, "set-get");
    store.set(&key, "hello", None).await?;
    assert_eq!(store.get(&key).await?.as_deref(), Some("hello"));
    Ok(())
}

async fn test_check_and_set_new(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::SupervisorClaim, "cas-new");
    let created = store.check_and_set(&key, "v1", None).await?;
    assert!(created, "check_and_set on new key should return true");
    assert_eq!(store.get(&key).await?.as_deref(), Some("v1"));
    Ok(())
}

async fn test_check_and_set_existing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::SupervisorClaim, "cas-existing");
    store.set(&key, "v1", None).await?;
    let created = store.check_and_set(&key, "v2", None).await?;
    assert!(!created, "check_and_set on existing key should return false");
    assert_eq!(store.get(&key).await?.as_deref(), Some("v1"));
    Ok(())
}

async fn test_delete(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Counter, "to-delete");
    store.set(&key, "bye", None).await?;
    assert!(store.delete(&key).await?);
    assert!(store.get(&key).await?.is_none());
    assert!(!store.delete(&key).await?, "delete on missing key returns false");
    Ok(())
}

async fn test_increment(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Counter, "counter-1");
    assert_eq!(store.increment(&key, 1, None).await?, 1);
    assert_eq!(store.increment(&key, 5, None).await?, 6);
    assert_eq!(store.increment(&key, -2, None).await?, 4);
    Ok(())
}

async fn test_compare_and_swap(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Circuit, "cas-version");
    store.set(&key, "initial", None).await?;

    let result = store.compare_and_swap(&key, 999, "updated", None).await?;
    assert!(matches!(result, CasResult::Conflict { .. }));

    let version = store.version(&key).await?;
    let result = store
        .compare_and_swap(&key, version, "updated", None)
        .await?;
    assert_eq!(result, CasResult::Ok);
    assert_eq!(store.get(&key).await?.as_deref(), Some("updated"));
    Ok(())
}

async fn test_ttl_set(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Counter, "ttl-test");
    store
        .set(&key, "ephemeral", Some(Duration::from_secs(3600)))
        .await?;
    assert_eq!(store.get(&key).await?.as_deref(), Some("ephemeral"));
    Ok(())
}

async fn test_scan_keys(store: &dyn StateStore) -> Result<(), StateError> {
    let a = test_key(KeyKind::Counter, "scan-a");
    let b = test_key(KeyKind::Counter, "scan-b");
    store.set(&a, "1", None).await?;
    store.set(&b, "2", None).await?;
    let found = store
        .scan_keys("test-tenant", KeyKind::Counter, Some("scan-"))
        .await?;
    assert!(found.iter().any(|(k, _)| k.contains("scan-a")));
    assert!(found.iter().any(|(k, _)| k.contains("scan-b")));
    Ok(())
}

/// Run the full distributed lock conformance suite.
///
/// # Errors
///
/// Returns the first conformance failure encountered.
pub async fn run_lock_conformance_tests(lock: &dyn DistributedLock) -> Result<(), StateError> {
    test_try_acquire_and_release(lock).await?;
    test_try_acquire_contention(lock).await?;
    test_lock_extend(lock).await?;
    test_lock_is_held(lock).await?;
    Ok(())
}

async fn test_try_acquire_and_release(lock: &dyn DistributedLock) -> Result<(), StateError> {
    let guard = lock
        .try_acquire("test-lock-1", Duration::from_secs(10))
        .await?;
    assert!(guard.is_some(), "should acquire uncontested lock");
    guard.unwrap().release().await?;
    Ok(())
}

async fn test_try_acquire_contention(lock: &dyn DistributedLock) -> Result<(), StateError> {
    let held = lock
        .try_acquire("test-lock-2", Duration::from_secs(10))
        .await?
        .expect("should acquire lock");

    let second = lock
        .try_acquire("test-lock-2", Duration::from_secs(10))
        .await?;
    assert!(second.is_none(), "second acquire should fail while held");

    held.release().await?;
    Ok(())
}

async fn test_lock_extend(lock: &dyn DistributedLock) -> Result<(), StateError> {
    let guard = lock
        .try_acquire("test-lock-3", Duration::from_secs(5))
        .await?
        .expect("should acquire lock");
    guard.extend(Duration::from_secs(10)).await?;
    assert!(guard.is_held().await?);
    guard.release().await?;
    Ok(())
}

async fn test_lock_is_held(lock: &dyn DistributedLock) -> Result<(), StateError> {
    let guard = lock
        .try_acquire("test-lock-4", Duration::from_secs(10))
        .await?
        .expect("should acquire lock");
    assert!(guard.is_held().await?);
    guard.release().await?;
    Ok(())
}
