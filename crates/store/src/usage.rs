use std::sync::Arc;

use async_trait::async_trait;
use llmgate_core::UsageRecord;
use llmgate_state::{KeyKind, StateKey, StateStore};

use crate::error::StoreError;
use crate::query::{Page, Query};

/// Append-only store for completion usage records. There is no update or
/// delete: a usage record, once written, is permanent.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn record(&self, record: UsageRecord) -> Result<(), StoreError>;

    async fn query(&self, query: &Query) -> Result<Page<UsageRecord>, StoreError>;
}

/// `UsageStore` built directly over a [`StateStore`]. Records are stored as
/// JSON blobs keyed by their id, scoped under the owning tenant; queries
/// scan the tenant's records and filter/paginate in memory, which is fine
/// for a single gateway instance but should be replaced by a backend with
/// server-side filtering at larger scale.
pub struct StateUsageStore {
    state: Arc<dyn StateStore>,
}

impl StateUsageStore {
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self { state }
    }

    fn kind() -> KeyKind {
        KeyKind::Custom("usage_record".to_string())
    }
}

#[async_trait]
impl UsageStore for StateUsageStore {
    async fn record(&self, record: UsageRecord) -> Result<(), StoreError> {
        let key = StateKey::new(record.tenant_id.clone(), Self::kind(), record.id.to_string());
        let value = serde_json::to_string(&record).map_err(|e| StoreError::Corrupt {
            id: record.id.to_string(),
            message: e.to_string(),
        })?;
        self.state.set(&key, &value, None).await?;
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Page<UsageRecord>, StoreError> {
        let Some(tenant_id) = &query.tenant_id else {
            return Err(StoreError::Corrupt {
                id: "query".to_string(),
                message: "usage queries require a tenant_id".to_string(),
            });
        };
        let rows = self
            .state
            .scan_keys(tenant_id.as_str(), Self::kind(), None)
            .await?;
        let mut records: Vec<UsageRecord> = rows
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_str::<UsageRecord>(&value).ok())
            .filter(|r| query.from.is_none_or(|from| r.created_at >= from))
            .filter(|r| query.to.is_none_or(|to| r.created_at <= to))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = records.len() as u64;
        let offset = query.effective_offset() as usize;
        let limit = query.effective_limit() as usize;
        let page = records.into_iter().skip(offset).take(limit).collect();

        Ok(Page {
            records: page,
            total,
            limit: query.effective_limit(),
            offset: query.effective_offset(),
        })
    }
}
