use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use llmgate_state::{CasResult, KeyKind, StateError, StateKey, StateStore};

struct Entry {
    value: String,
    version: u64,
    expires_at: Option<chrono::DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| t <= Utc::now())
    }
}

/// Default in-process `StateStore`. Entries live in a `DashMap` keyed by
/// the key's canonical string form; expiry is checked lazily on read.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn expires_at(ttl: Option<Duration>) -> Option<chrono::DateTime<Utc>> {
        ttl.and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| Utc::now() + d)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        let canonical = key.canonical();
        if let Some(existing) = self.entries.get(&canonical) {
            if !existing.is_expired() {
                return Ok(false);
            }
        }
        self.entries.insert(
            canonical,
            Entry {
                value: value.to_string(),
                version: 1,
                expires_at: Self::expires_at(ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        let canonical = key.canonical();
        match self.entries.get(&canonical) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        let canonical = key.canonical();
        let version = self
            .entries
            .get(&canonical)
            .filter(|e| !e.is_expired())
            .map_or(1, |e| e.version + 1);
        self.entries.insert(
            canonical,
            Entry {
                value: value.to_string(),
                version,
                expires_at: Self::expires_at(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        let canonical = key.canonical();
        match self.entries.remove(&canonical) {
            Some((_, entry)) => Ok(!entry.is_expired()),
            None => Ok(false),
        }
    }

    async fn increment(
        &self,
        key: &StateKey,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StateError> {
        let canonical = key.canonical();
        let mut entry = self.entries.entry(canonical).or_insert_with(|| Entry {
            value: "0".to_string(),
            version: 0,
            expires_at: Self::expires_at(ttl),
        });
        if entry.is_expired() {
            entry.value = "0".to_string();
            entry.version = 0;
            entry.expires_at = Self::expires_at(ttl);
        }
        let current: i64 = entry.value.parse().map_err(|_| StateError::Corrupt {
            key: key.canonical(),
            message: "counter value is not an integer".to_string(),
        })?;
        let next = current + delta;
        entry.value = next.to_string();
        entry.version += 1;
        Ok(next)
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        let canonical = key.canonical();
        let mut slot = self.entries.entry(canonical.clone()).or_insert_with(|| Entry {
            value: String::new(),
            version: 0,
            expires_at: None,
        });
        let current_version = if slot.is_expired() { 0 } else { slot.version };
        if current_version != expected_version {
            return Ok(CasResult::Conflict {
                current_value: if slot.is_expired() {
                    None
                } else {
                    Some(slot.value.clone())
                },
                current_version,
            });
        }
        slot.value = new_value.to_string();
        slot.version = current_version + 1;
        slot.expires_at = Self::expires_at(ttl);
        Ok(CasResult::Ok)
    }

    async fn version(&self, key: &StateKey) -> Result<u64, StateError> {
        let canonical = key.canonical();
        Ok(self
            .entries
            .get(&canonical)
            .filter(|e| !e.is_expired())
            .map_or(0, |e| e.version))
    }

    async fn scan_keys(
        &self,
        tenant: &str,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, StateError> {
        let kind_prefix = format!("{tenant}:{kind}:");
        let mut out = Vec::new();
        for item in &self.entries {
            let canonical = item.key();
            if !canonical.starts_with(&kind_prefix) {
                continue;
            }
            if let Some(prefix) = prefix {
                let id = &canonical[kind_prefix.len()..];
                if !id.starts_with(prefix) {
                    continue;
                }
            }
            if item.value().is_expired() {
                continue;
            }
            out.push((canonical.clone(), item.value().value.clone()));
        }
        Ok(out)
    }
}
