use std::sync::Arc;

use async_trait::async_trait;
use llmgate_core::{Bot, BotId, TenantId};
use llmgate_state::{KeyKind, StateKey, StateStore};

use crate::error::StoreError;

/// CRUD store for bots tracked by the health checker. Scoped per tenant,
/// since a bot belongs to exactly one tenant.
#[async_trait]
pub trait BotStore: Send + Sync {
    async fn get(&self, tenant_id: &TenantId, id: &BotId) -> Result<Option<Bot>, StoreError>;

    async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Bot>, StoreError>;

    async fn upsert(&self, bot: Bot) -> Result<(), StoreError>;
}

pub struct StateBotStore {
    state: Arc<dyn StateStore>,
}

impl StateBotStore {
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self { state }
    }

    fn kind() -> KeyKind {
        KeyKind::Custom("bot".to_string())
    }
}

#[async_trait]
impl BotStore for StateBotStore {
    async fn get(&self, tenant_id: &TenantId, id: &BotId) -> Result<Option<Bot>, StoreError> {
        let key = StateKey::new(tenant_id.clone(), Self::kind(), id.as_str());
        match self.state.get(&key).await? {
            Some(value) => {
                let bot = serde_json::from_str(&value).map_err(|e| StoreError::Corrupt {
                    id: id.to_string(),
                    message: e.to_string(),
                })?;
                Ok(Some(bot))
            }
            None => Ok(None),
        }
    }

    async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Bot>, StoreError> {
        let rows = self
            .state
            .scan_keys(tenant_id.as_str(), Self::kind(), None)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_str::<Bot>(&value).ok())
            .collect())
    }

    async fn upsert(&self, bot: Bot) -> Result<(), StoreError> {
        let key = StateKey::new(bot.tenant_id.clone(), Self::kind(), bot.id.as_str());
        let value = serde_json::to_string(&bot).map_err(|e| StoreError::Corrupt {
            id: bot.id.to_string(),
            message: e.to_string(),
        })?;
        self.state.set(&key, &value, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_state_memory::MemoryStateStore;

    fn bot(tenant: &str, id: &str) -> Bot {
        Bot {
            id: BotId::from(id),
            tenant_id: TenantId::from(tenant),
            name: "support-bot".into(),
            ..Bot::default()
        }
    }

    #[tokio::test]
    async fn round_trips_a_bot() {
        let store = StateBotStore::new(Arc::new(MemoryStateStore::new()));
        store.upsert(bot("t1", "bot-1")).await.unwrap();
        let found = store
            .get(&TenantId::from("t1"), &BotId::from("bot-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "support-bot");
    }

    #[tokio::test]
    async fn bots_are_scoped_per_tenant() {
        let store = StateBotStore::new(Arc::new(MemoryStateStore::new()));
        store.upsert(bot("t1", "bot-1")).await.unwrap();
        store.upsert(bot("t2", "bot-2")).await.unwrap();
        let t1_bots = store.list_for_tenant(&TenantId::from("t1")).await.unwrap();
        assert_eq!(t1_bots.len(), 1);
        assert_eq!(t1_bots[0].id, BotId::from("bot-1"));
    }
}
