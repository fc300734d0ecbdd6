use std::sync::Arc;

use async_trait::async_trait;
use llmgate_core::{AdminAgent, AdminAgentId, TenantId};
use llmgate_state::{KeyKind, StateKey, StateStore};

use crate::error::StoreError;

/// CRUD store for admin agents: the units the supervisor loop fans out to
/// on each cycle. Stored in the gateway-wide namespace (rather than per
/// tenant) so a single cycle can list every agent across every tenant in
/// one scan; `list_for_tenant` filters that same namespace by id prefix.
#[async_trait]
pub trait AdminAgentStore: Send + Sync {
    async fn get(
        &self,
        tenant_id: &TenantId,
        id: &AdminAgentId,
    ) -> Result<Option<AdminAgent>, StoreError>;

    async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<AdminAgent>, StoreError>;

    /// Every admin agent across every tenant, used by the supervisor loop
    /// to build a cycle's full worklist.
    async fn list_all(&self) -> Result<Vec<AdminAgent>, StoreError>;

    async fn upsert(&self, agent: AdminAgent) -> Result<(), StoreError>;
}

pub struct StateAdminAgentStore {
    state: Arc<dyn StateStore>,
}

impl StateAdminAgentStore {
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self { state }
    }

    fn kind() -> KeyKind {
        KeyKind::Custom("admin_agent".to_string())
    }

    fn storage_id(tenant_id: &TenantId, id: &AdminAgentId) -> String {
        format!("{tenant_id}:{id}")
    }
}

#[async_trait]
impl AdminAgentStore for StateAdminAgentStore {
    async fn get(
        &self,
        tenant_id: &TenantId,
        id: &AdminAgentId,
    ) -> Result<Option<AdminAgent>, StoreError> {
        let key = StateKey::global(Self::kind(), Self::storage_id(tenant_id, id));
        match self.state.get(&key).await? {
            Some(value) => {
                let agent = serde_json::from_str(&value).map_err(|e| StoreError::Corrupt {
                    id: id.to_string(),
                    message: e.to_string(),
                })?;
                Ok(Some(agent))
            }
            None => Ok(None),
        }
    }

    async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<AdminAgent>, StoreError> {
        let rows = self
            .state
            .scan_keys("_global", Self::kind(), Some(&format!("{tenant_id}:")))
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_str::<AdminAgent>(&value).ok())
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<AdminAgent>, StoreError> {
        let rows = self.state.scan_keys("_global", Self::kind(), None).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_str::<AdminAgent>(&value).ok())
            .collect())
    }

    async fn upsert(&self, agent: AdminAgent) -> Result<(), StoreError> {
        let key = StateKey::global(
            Self::kind(),
            Self::storage_id(&agent.tenant_id, &agent.id),
        );
        let value = serde_json::to_string(&agent).map_err(|e| StoreError::Corrupt {
            id: agent.id.to_string(),
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
    use llmgate_core::{AdminAgentStatus, BotId};
    use llmgate_state_memory::MemoryStateStore;

    fn agent(tenant: &str, id: &str) -> AdminAgent {
        AdminAgent {
            id: AdminAgentId::from(id),
            tenant_id: TenantId::from(tenant),
            bot_id: BotId::from("bot-1"),
            status: AdminAgentStatus::Active,
            health_check_enabled: true,
            auto_restart_enabled: true,
            max_restart_attempts: 3,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn round_trips_an_admin_agent() {
        let store = StateAdminAgentStore::new(Arc::new(MemoryStateStore::new()));
        store.upsert(agent("t1", "aa-1")).await.unwrap();
        let found = store
            .get(&TenantId::from("t1"), &AdminAgentId::from("aa-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.bot_id, BotId::from("bot-1"));
    }

    #[tokio::test]
    async fn list_all_spans_every_tenant_and_list_for_tenant_filters() {
        let store = StateAdminAgentStore::new(Arc::new(MemoryStateStore::new()));
        store.upsert(agent("t1", "aa-1")).await.unwrap();
        store.upsert(agent("t2", "aa-2")).await.unwrap();
        assert_eq!(store.list_all().await.unwrap().len(), 2);
        assert_eq!(
            store
                .list_for_tenant(&TenantId::from("t1"))
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
