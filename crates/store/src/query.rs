use chrono::{DateTime, Utc};

use llmgate_core::TenantId;

/// A filtered, paginated query over an append-only record store.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub tenant_id: Option<TenantId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Query {
    /// Effective page size, clamped to 1..=1000, defaulting to 50.
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(50).clamp(1, 1000)
    }

    /// Effective offset, defaulting to 0.
    #[must_use]
    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// A page of results from a [`Query`].
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_limit_clamps_and_defaults() {
        assert_eq!(Query::default().effective_limit(), 50);
        assert_eq!(
            Query {
                limit: Some(5000),
                ..Default::default()
            }
            .effective_limit(),
            1000
        );
        assert_eq!(
            Query {
                limit: Some(0),
                ..Default::default()
            }
            .effective_limit(),
            1
        );
    }
}
