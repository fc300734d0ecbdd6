use std::sync::Arc;

use async_trait::async_trait;
use llmgate_core::{Provider, ProviderId};
use llmgate_state::{KeyKind, StateKey, StateStore};

use crate::error::StoreError;

/// CRUD store for provider configuration: routing priority, rate limits,
/// cost rates and the operator-controlled `status` (the router and circuit
/// breaker consult this alongside their own in-memory breaker state).
#[async_trait]
pub trait ProviderStore: Send + Sync {
    async fn get(&self, id: &ProviderId) -> Result<Option<Provider>, StoreError>;

    async fn list(&self) -> Result<Vec<Provider>, StoreError>;

    async fn upsert(&self, provider: Provider) -> Result<(), StoreError>;
}

pub struct StateProviderStore {
    state: Arc<dyn StateStore>,
}

impl StateProviderStore {
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self { state }
    }

    fn kind() -> KeyKind {
        KeyKind::Custom("provider".to_string())
    }
}

#[async_trait]
impl ProviderStore for StateProviderStore {
    async fn get(&self, id: &ProviderId) -> Result<Option<Provider>, StoreError> {
        let key = StateKey::global(Self::kind(), id.as_str());
        match self.state.get(&key).await? {
            Some(value) => {
                let provider = serde_json::from_str(&value).map_err(|e| StoreError::Corrupt {
                    id: id.to_string(),
                    message: e.to_string(),
                })?;
                Ok(Some(provider))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Provider>, StoreError> {
        let rows = self.state.scan_keys("_global", Self::kind(), None).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_str::<Provider>(&value).ok())
            .collect())
    }

    async fn upsert(&self, provider: Provider) -> Result<(), StoreError> {
        let key = StateKey::global(Self::kind(), provider.id.as_str());
        let value = serde_json::to_string(&provider).map_err(|e| StoreError::Corrupt {
            id: provider.id.to_string(),
            message: e.to_string(),
        })?;
        self.state.set(&key, &value, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use llmgate_core::{CostRates, ProviderStatus, ProviderType};
    use llmgate_state_memory::MemoryStateStore;
    use rust_decimal::Decimal;

    fn provider(id: &str) -> Provider {
        Provider {
            id: ProviderId::from(id),
            name: "OpenAI".into(),
            provider_type: ProviderType::Vendor,
            priority: 0,
            status: ProviderStatus::Active,
            rate_limit_per_minute: 60,
            max_concurrency: 10,
            cost_rates: CostRates {
                input_cost_per_1k_tokens: Decimal::new(1, 2),
                output_cost_per_1k_tokens: Decimal::new(2, 2),
            },
            models: vec!["gpt-4o".to_string()],
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn round_trips_a_provider() {
        let store = StateProviderStore::new(Arc::new(MemoryStateStore::new()));
        store.upsert(provider("openai")).await.unwrap();
        let found = store
            .get(&ProviderId::from("openai"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "OpenAI");
    }

    #[tokio::test]
    async fn list_returns_every_provider() {
        let store = StateProviderStore::new(Arc::new(MemoryStateStore::new()));
        store.upsert(provider("openai")).await.unwrap();
        store.upsert(provider("anthropic")).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 2);
    }
}
