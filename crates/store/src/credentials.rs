use std::sync::Arc;

use async_trait::async_trait;
use llmgate_core::{Credential, CredentialId, ProviderId};
use llmgate_state::{KeyKind, StateKey, StateStore};

use crate::error::StoreError;

/// CRUD store for credentials within a provider's pool. Stored in the
/// gateway-wide namespace, keyed by `provider_id:credential_id`, so the
/// full pool for a provider can be listed in one scan.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(
        &self,
        provider_id: &ProviderId,
        id: &CredentialId,
    ) -> Result<Option<Credential>, StoreError>;

    async fn list_for_provider(
        &self,
        provider_id: &ProviderId,
    ) -> Result<Vec<Credential>, StoreError>;

    async fn upsert(&self, credential: Credential) -> Result<(), StoreError>;
}

pub struct StateCredentialStore {
    state: Arc<dyn StateStore>,
}

impl StateCredentialStore {
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self { state }
    }

    fn kind() -> KeyKind {
        KeyKind::Custom("credential".to_string())
    }

    fn storage_id(provider_id: &ProviderId, id: &CredentialId) -> String {
        format!("{provider_id}:{id}")
    }
}

#[async_trait]
impl CredentialStore for StateCredentialStore {
    async fn get(
        &self,
        provider_id: &ProviderId,
        id: &CredentialId,
    ) -> Result<Option<Credential>, StoreError> {
        let key = StateKey::global(Self::kind(), Self::storage_id(provider_id, id));
        match self.state.get(&key).await? {
            Some(value) => {
                let credential = serde_json::from_str(&value).map_err(|e| StoreError::Corrupt {
                    id: id.to_string(),
                    message: e.to_string(),
                })?;
                Ok(Some(credential))
            }
            None => Ok(None),
        }
    }

    async fn list_for_provider(
        &self,
        provider_id: &ProviderId,
    ) -> Result<Vec<Credential>, StoreError> {
        let rows = self
            .state
            .scan_keys("_global", Self::kind(), Some(&format!("{provider_id}:")))
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_str::<Credential>(&value).ok())
            .collect())
    }

    async fn upsert(&self, credential: Credential) -> Result<(), StoreError> {
        let key = StateKey::global(
            Self::kind(),
            Self::storage_id(&credential.provider_id, &credential.id),
        );
        let value = serde_json::to_string(&credential).map_err(|e| StoreError::Corrupt {
            id: credential.id.to_string(),
            message: e.to_string(),
        })?;
        self.state.set(&key, &value, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_core::CredentialStatus;
    use llmgate_state_memory::MemoryStateStore;
    use rust_decimal::Decimal;

    fn credential(provider: &str, id: &str) -> Credential {
        Credential {
            id: CredentialId::from(id),
            provider_id: ProviderId::from(provider),
            priority: 0,
            status: CredentialStatus::Active,
            emergency: false,
            quota_limit: None,
            quota_used: 0,
            last_used_at: None,
            cost_used: Decimal::ZERO,
            last_error_at: None,
        }
    }

    #[tokio::test]
    async fn round_trips_a_credential() {
        let store = StateCredentialStore::new(Arc::new(MemoryStateStore::new()));
        store.upsert(credential("openai", "cred-1")).await.unwrap();
        let found = store
            .get(&ProviderId::from("openai"), &CredentialId::from("cred-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.provider_id, ProviderId::from("openai"));
    }

    #[tokio::test]
    async fn credentials_are_scoped_per_provider() {
        let store = StateCredentialStore::new(Arc::new(MemoryStateStore::new()));
        store.upsert(credential("openai", "cred-1")).await.unwrap();
        store
            .upsert(credential("anthropic", "cred-2"))
            .await
            .unwrap();
        let pool = store
            .list_for_provider(&ProviderId::from("openai"))
            .await
            .unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].id, CredentialId::from("cred-1"));
    }
}
