use std::sync::Arc;

use async_trait::async_trait;
use llmgate_core::{BotHealthLog, BotId};
use llmgate_state::{KeyKind, StateKey, StateStore};

use crate::error::StoreError;

/// Append-only store of bot liveness probe results.
#[async_trait]
pub trait HealthLogStore: Send + Sync {
    async fn record(&self, log: BotHealthLog) -> Result<(), StoreError>;

    /// Most recent `limit` probe results for a bot, newest first. Used by
    /// the health checker to count consecutive `Unhealthy` results before
    /// classifying a bot `Dead`.
    async fn recent(&self, bot_id: &BotId, limit: usize) -> Result<Vec<BotHealthLog>, StoreError>;
}

pub struct StateHealthLogStore {
    state: Arc<dyn StateStore>,
}

impl StateHealthLogStore {
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self { state }
    }

    fn kind() -> KeyKind {
        KeyKind::Custom("bot_health_log".to_string())
    }
}

#[async_trait]
impl HealthLogStore for StateHealthLogStore {
    async fn record(&self, log: BotHealthLog) -> Result<(), StoreError> {
        let key = StateKey::global(Self::kind(), format!("{}:{}", log.bot_id, log.id));
        let value = serde_json::to_string(&log).map_err(|e| StoreError::Corrupt {
            id: log.id.to_string(),
            message: e.to_string(),
        })?;
        self.state.set(&key, &value, None).await?;
        Ok(())
    }

    async fn recent(&self, bot_id: &BotId, limit: usize) -> Result<Vec<BotHealthLog>, StoreError> {
        let rows = self
            .state
            .scan_keys("_global", Self::kind(), Some(&format!("{bot_id}:")))
            .await?;
        let mut logs: Vec<BotHealthLog> = rows
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_str::<BotHealthLog>(&value).ok())
            .collect();
        logs.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
        logs.truncate(limit);
        Ok(logs)
    }
}
