use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use llmgate_state::{DistributedLock, LockGuard, StateError};
use uuid::Uuid;

struct LockRecord {
    token: Uuid,
    expires_at: chrono::DateTime<Utc>,
}

/// Default in-process `DistributedLock`. Locks are identified by name and
/// hold an owner token so a guard can only extend or release the lock it
/// actually acquired, even if the TTL has since been taken over by another
/// holder.
#[derive(Default, Clone)]
pub struct MemoryDistributedLock {
    locks: Arc<DashMap<String, LockRecord>>,
}

impl MemoryDistributedLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn try_take(&self, name: &str, ttl: Duration) -> Option<Uuid> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(30));
        let mut entry = self.locks.entry(name.to_string());
        match &mut entry {
            dashmap::mapref::entry::Entry::Occupied(occ) if occ.get().expires_at > now => None,
            dashmap::mapref::entry::Entry::Occupied(mut occ) => {
                let token = Uuid::new_v4();
                occ.insert(LockRecord {
                    token,
                    expires_at: now + ttl,
                });
                Some(token)
            }
            dashmap::mapref::entry::Entry::Vacant(vac) => {
                let token = Uuid::new_v4();
                vac.insert(LockRecord {
                    token,
                    expires_at: now + ttl,
                });
                Some(token)
            }
        }
    }
}

#[async_trait]
impl DistributedLock for MemoryDistributedLock {
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>, StateError> {
        Ok(self.try_take(name, ttl).map(|token| {
            Box::new(MemoryLockGuard {
                locks: self.locks.clone(),
                name: name.to_string(),
                token,
            }) as Box<dyn LockGuard>
        }))
    }

    async fn acquire(
        &self,
        name: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Box<dyn LockGuard>, StateError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Some(guard) = self.try_acquire(name, ttl).await? {
                return Ok(guard);
            }
            if std::time::Instant::now() >= deadline {
                return Err(StateError::LockTimeout(timeout));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

struct MemoryLockGuard {
    locks: Arc<DashMap<String, LockRecord>>,
    name: String,
    token: Uuid,
}

impl MemoryLockGuard {
    fn owns_current(&self) -> bool {
        self.locks
            .get(&self.name)
            .is_some_and(|r| r.token == self.token && r.expires_at > Utc::now())
    }
}

#[async_trait]
impl LockGuard for MemoryLockGuard {
    async fn extend(&self, duration: Duration) -> Result<(), StateError> {
        if let Some(mut record) = self.locks.get_mut(&self.name) {
            if record.token == self.token {
                let extra = chrono::Duration::from_std(duration)
                    .unwrap_or(chrono::Duration::seconds(30));
                record.expires_at = Utc::now() + extra;
            }
        }
        Ok(())
    }

    async fn release(self: Box<Self>) -> Result<(), StateError> {
        if self.owns_current() {
            self.locks.remove(&self.name);
        }
        Ok(())
    }

    async fn is_held(&self) -> Result<bool, StateError> {
        Ok(self.owns_current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_lock_conformance_suite() {
        let lock = MemoryDistributedLock::new();
        llmgate_state::testing::run_lock_conformance_tests(&lock)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn acquire_waits_for_expiry() {
        let lock = MemoryDistributedLock::new();
        let held = lock
            .try_acquire("wait-lock", Duration::from_millis(30))
            .await
            .unwrap()
            .unwrap();
        drop(held);
        let guard = lock
            .acquire(
                "wait-lock",
                Duration::from_secs(5),
                Duration::from_millis(500),
            )
            .await
            .unwrap();
        assert!(guard.is_held().await.unwrap());
    }
}
