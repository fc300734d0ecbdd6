use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use llmgate_core::{AlertType, TenantId, UsageAlert};
use llmgate_state::{KeyKind, StateKey, StateStore};

use crate::error::StoreError;
use crate::query::{Page, Query};

/// Store for usage alerts. Alerts are created once and only ever
/// acknowledged afterward — there is no update beyond the
/// `acknowledged`/`acknowledged_at` fields and no delete.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create(&self, alert: UsageAlert) -> Result<(), StoreError>;

    /// Find an existing, unacknowledged alert for the same
    /// `(tenant, alert_type, threshold, period)` tuple, used to enforce the
    /// at-most-one-unacknowledged invariant before creating a new alert.
    async fn find_unacknowledged(
        &self,
        tenant_id: &TenantId,
        alert_type: AlertType,
        threshold: rust_decimal::Decimal,
        period: &str,
    ) -> Result<Option<UsageAlert>, StoreError>;

    async fn acknowledge(&self, tenant_id: &TenantId, alert_id: uuid::Uuid) -> Result<bool, StoreError>;

    async fn query(&self, query: &Query) -> Result<Page<UsageAlert>, StoreError>;
}

pub struct StateAlertStore {
    state: Arc<dyn StateStore>,
}

impl StateAlertStore {
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self { state }
    }

    fn kind() -> KeyKind {
        KeyKind::Custom("usage_alert".to_string())
    }

    async fn load_tenant_alerts(&self, tenant_id: &TenantId) -> Result<Vec<UsageAlert>, StoreError> {
        let rows = self
            .state
            .scan_keys(tenant_id.as_str(), Self::kind(), None)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_str::<UsageAlert>(&value).ok())
            .collect())
    }

    async fn save(&self, alert: &UsageAlert) -> Result<(), StoreError> {
        let key = StateKey::new(alert.tenant_id.clone(), Self::kind(), alert.id.to_string());
        let value = serde_json::to_string(alert).map_err(|e| StoreError::Corrupt {
            id: alert.id.to_string(),
            message: e.to_string(),
        })?;
        self.state.set(&key, &value, None).await?;
        Ok(())
    }
}

#[async_trait]
impl AlertStore for StateAlertStore {
    async fn create(&self, alert: UsageAlert) -> Result<(), StoreError> {
        self.save(&alert).await
    }

    async fn find_unacknowledged(
        &self,
        tenant_id: &TenantId,
        alert_type: AlertType,
        threshold: rust_decimal::Decimal,
        period: &str,
    ) -> Result<Option<UsageAlert>, StoreError> {
        let alerts = self.load_tenant_alerts(tenant_id).await?;
        Ok(alerts.into_iter().find(|a| {
            !a.acknowledged
                && a.alert_type == alert_type
                && a.threshold == threshold
                && a.period == period
        }))
    }

    async fn acknowledge(&self, tenant_id: &TenantId, alert_id: uuid::Uuid) -> Result<bool, StoreError> {
        let Some(mut alert) = self
            .load_tenant_alerts(tenant_id)
            .await?
            .into_iter()
            .find(|a| a.id == alert_id)
        else {
            return Ok(false);
        };
        if alert.acknowledged {
            return Ok(true);
        }
        alert.acknowledged = true;
        alert.acknowledged_at = Some(Utc::now());
        self.save(&alert).await?;
        Ok(true)
    }

    async fn query(&self, query: &Query) -> Result<Page<UsageAlert>, StoreError> {
        let Some(tenant_id) = &query.tenant_id else {
            return Err(StoreError::Corrupt {
                id: "query".to_string(),
                message: "alert queries require a tenant_id".to_string(),
            });
        };
        let mut alerts = self.load_tenant_alerts(tenant_id).await?;
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = alerts.len() as u64;
        let offset = query.effective_offset() as usize;
        let limit = query.effective_limit() as usize;
        let page = alerts.into_iter().skip(offset).take(limit).collect();
        Ok(Page {
            records: page,
            total,
            limit: query.effective_limit(),
            offset: query.effective_offset(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_core::AlertSeverity;
    use llmgate_state_memory::MemoryStateStore;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn alert(tenant: &str, threshold: i64) -> UsageAlert {
        UsageAlert {
            id: Uuid::new_v4(),
            tenant_id: TenantId::from(tenant),
            alert_type: AlertType::BudgetWarning,
            severity: AlertSeverity::Warning,
            threshold: Decimal::new(threshold, 2),
            percent_used: Decimal::new(90, 2),
            period: "2026-07".to_string(),
            acknowledged: false,
            acknowledged_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn finds_unacknowledged_match_by_full_tuple() {
        let store = StateAlertStore::new(Arc::new(MemoryStateStore::new()));
        let a = alert("t1", 20);
        store.create(a.clone()).await.unwrap();

        let found = store
            .find_unacknowledged(&TenantId::from("t1"), AlertType::BudgetWarning, Decimal::new(20, 2), "2026-07")
            .await
            .unwrap();
        assert!(found.is_some());

        let not_found = store
            .find_unacknowledged(&TenantId::from("t1"), AlertType::BudgetWarning, Decimal::new(10, 2), "2026-07")
            .await
            .unwrap();
        assert!(not_found.is_none());
    }

    #[tokio::test]
    async fn acknowledged_alerts_are_excluded_from_lookup() {
        let store = StateAlertStore::new(Arc::new(MemoryStateStore::new()));
        let a = alert("t1", 20);
        let id = a.id;
        store.create(a).await.unwrap();
        store.acknowledge(&TenantId::from("t1"), id).await.unwrap();

        let found = store
            .find_unacknowledged(&TenantId::from("t1"), AlertType::BudgetWarning, Decimal::new(20, 2), "2026-07")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn acknowledge_is_idempotent() {
        let store = StateAlertStore::new(Arc::new(MemoryStateStore::new()));
        let a = alert("t1", 20);
        let id = a.id;
        store.create(a).await.unwrap();

        assert!(store.acknowledge(&TenantId::from("t1"), id).await.unwrap());
        let acknowledged_at_first = store
            .query(&crate::Query { tenant_id: Some(TenantId::from("t1")), ..Default::default() })
            .await
            .unwrap()
            .records
            .into_iter()
            .find(|a| a.id == id)
            .unwrap()
            .acknowledged_at
            .unwrap();

        assert!(store.acknowledge(&TenantId::from("t1"), id).await.unwrap());
        let acknowledged_at_second = store
            .query(&crate::Query { tenant_id: Some(TenantId::from("t1")), ..Default::default() })
            .await
            .unwrap()
            .records
            .into_iter()
            .find(|a| a.id == id)
            .unwrap()
            .acknowledged_at
            .unwrap();

        assert_eq!(acknowledged_at_first, acknowledged_at_second);
    }
}
