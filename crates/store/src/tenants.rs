use std::sync::Arc;

use async_trait::async_trait;
use llmgate_core::{Tenant, TenantId};
use llmgate_state::{KeyKind, StateKey, StateStore};

use crate::error::StoreError;

/// CRUD store for tenant configuration. Unlike the append-only usage/alert
/// stores, tenants are mutable: budgets, limits and the suspended flag are
/// all updated in place by operator action or by the supervisor loop.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError>;

    /// All tenants, including soft-deleted ones. Callers that care about
    /// `deleted` or `suspended` filter for themselves.
    async fn list(&self) -> Result<Vec<Tenant>, StoreError>;

    /// Insert or overwrite a tenant in full.
    async fn upsert(&self, tenant: Tenant) -> Result<(), StoreError>;
}

/// `TenantStore` over a [`StateStore`]: each tenant is a single JSON blob
/// keyed by its own id, scoped under the gateway-wide namespace since a
/// tenant isn't itself scoped to another tenant.
pub struct StateTenantStore {
    state: Arc<dyn StateStore>,
}

impl StateTenantStore {
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self { state }
    }

    fn kind() -> KeyKind {
        KeyKind::Custom("tenant".to_string())
    }
}

#[async_trait]
impl TenantStore for StateTenantStore {
    async fn get(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError> {
        let key = StateKey::global(Self::kind(), id.as_str());
        match self.state.get(&key).await? {
            Some(value) => {
                let tenant = serde_json::from_str(&value).map_err(|e| StoreError::Corrupt {
                    id: id.to_string(),
                    message: e.to_string(),
                })?;
                Ok(Some(tenant))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Tenant>, StoreError> {
        let rows = self.state.scan_keys("_global", Self::kind(), None).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_str::<Tenant>(&value).ok())
            .collect())
    }

    async fn upsert(&self, tenant: Tenant) -> Result<(), StoreError> {
        let key = StateKey::global(Self::kind(), tenant.id.as_str());
        let value = serde_json::to_string(&tenant).map_err(|e| StoreError::Corrupt {
            id: tenant.id.to_string(),
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
    use llmgate_state_memory::MemoryStateStore;
    use rust_decimal::Decimal;

    fn tenant(id: &str) -> Tenant {
        Tenant {
            id: TenantId::from(id),
            name: "Acme".into(),
            monthly_budget: Decimal::new(10000, 2),
            daily_budget: None,
            limits: Default::default(),
            allowed_agents: vec![],
            allowed_providers: vec![],
            suspended: false,
            suspend_on_exceed: false,
            deleted: false,
            alert_thresholds: Default::default(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn round_trips_a_tenant() {
        let store = StateTenantStore::new(Arc::new(MemoryStateStore::new()));
        store.upsert(tenant("t1")).await.unwrap();
        let found = store.get(&TenantId::from("t1")).await.unwrap().unwrap();
        assert_eq!(found.id, TenantId::from("t1"));
        assert!(store.get(&TenantId::from("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_overwrites_and_list_returns_all() {
        let store = StateTenantStore::new(Arc::new(MemoryStateStore::new()));
        store.upsert(tenant("t1")).await.unwrap();
        let mut suspended = tenant("t1");
        suspended.suspended = true;
        store.upsert(suspended).await.unwrap();
        store.upsert(tenant("t2")).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        let t1 = all.iter().find(|t| t.id == TenantId::from("t1")).unwrap();
        assert!(t1.suspended);
    }
}
