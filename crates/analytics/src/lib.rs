//! Analytics Aggregator: read-only rollups over the usage record store.
//!
//! Every aggregate is computed in-process from a [`Query`] page rather than
//! pushed down into the store, matching `StateUsageStore`'s in-memory scan
//! semantics — a real backend would replace these with server-side
//! aggregation, but the contract stays the same.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use llmgate_core::{AgentId, GatewayError, ModelId, ProviderId, TenantId, UsageRecord};
use llmgate_store::{Query, UsageStore};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// The period a `summary` or grouped aggregate is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    /// Start instant for this period, per the fixed boundary rules: day
    /// starts at local midnight UTC, week is 7 days back from now, month
    /// is the 1st of the current month at 00:00 UTC.
    #[must_use]
    pub fn start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Period::Day => now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc(),
            Period::Week => now - Duration::days(7),
            Period::Month => Utc
                .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
                .single()
                .unwrap(),
        }
    }
}

/// Totals and top-N breakdowns for one tenant over one period.
#[derive(Debug, Clone)]
pub struct Summary {
    pub total_cost: Decimal,
    pub total_tokens: u64,
    pub total_requests: u64,
    pub avg_latency_ms: f64,
    pub success_rate: f64,
    pub top_agents: Vec<(AgentId, Decimal)>,
    pub top_models: Vec<(ModelId, Decimal)>,
    /// Projected end-of-month spend: `(used_so_far / days_elapsed) *
    /// days_in_month`. `None` outside a month-period summary.
    pub projected_month_end: Option<Decimal>,
}

/// One row of a grouped aggregate, with its share of the period's total
/// cost.
#[derive(Debug, Clone)]
pub struct GroupedRow<K> {
    pub key: K,
    pub cost: Decimal,
    pub tokens: u64,
    pub requests: u64,
    pub cost_share: f64,
}

pub struct AnalyticsAggregator {
    usage: std::sync::Arc<dyn UsageStore>,
}

impl AnalyticsAggregator {
    #[must_use]
    pub fn new(usage: std::sync::Arc<dyn UsageStore>) -> Self {
        Self { usage }
    }

    async fn records_since(&self, tenant_id: &TenantId, since: DateTime<Utc>) -> Result<Vec<UsageRecord>, GatewayError> {
        let page = self
            .usage
            .query(&Query {
                tenant_id: Some(tenant_id.clone()),
                from: Some(since),
                to: None,
                limit: Some(1000),
                offset: Some(0),
            })
            .await
            .map_err(|e| GatewayError::State(e.to_string()))?;

        let mut offset = page.records.len() as u32;
        let mut records = page.records;
        // The store's Page caps at 1000 rows; keep paging until exhausted
        // so large-volume tenants still get an accurate rollup.
        while (offset as u64) < page.total {
            let next = self
                .usage
                .query(&Query {
                    tenant_id: Some(tenant_id.clone()),
                    from: Some(since),
                    to: None,
                    limit: Some(1000),
                    offset: Some(offset),
                })
                .await
                .map_err(|e| GatewayError::State(e.to_string()))?;
            if next.records.is_empty() {
                break;
            }
            offset += next.records.len() as u32;
            records.extend(next.records);
        }
        Ok(records)
    }

    pub async fn summary(&self, tenant_id: &TenantId, period: Period, now: DateTime<Utc>) -> Result<Summary, GatewayError> {
        let records = self.records_since(tenant_id, period.start(now)).await?;

        let total_cost: Decimal = records.iter().map(|r| r.cost).sum();
        let total_tokens: u64 = records.iter().map(|r| r.total_tokens).sum();
        let total_requests = records.len() as u64;
        let avg_latency_ms = if total_requests == 0 {
            0.0
        } else {
            records.iter().map(|r| r.latency_ms as f64).sum::<f64>() / total_requests as f64
        };
        let succeeded = records.iter().filter(|r| r.succeeded).count() as f64;
        let success_rate = if total_requests == 0 { 1.0 } else { succeeded / total_requests as f64 };

        let top_agents = top_n(&records, |r| r.agent_id.clone());
        let top_models = top_n(&records, |r| r.model_id.clone());

        let projected_month_end = if period == Period::Month {
            let days_elapsed = (now - period.start(now)).num_days().max(1);
            let days_in_month = days_in_month(now.year(), now.month());
            Some(total_cost / Decimal::from(days_elapsed) * Decimal::from(days_in_month))
        } else {
            None
        };

        Ok(Summary {
            total_cost,
            total_tokens,
            total_requests,
            avg_latency_ms,
            success_rate,
            top_agents,
            top_models,
            projected_month_end,
        })
    }

    pub async fn by_agent(&self, tenant_id: &TenantId, period: Period, now: DateTime<Utc>) -> Result<Vec<GroupedRow<AgentId>>, GatewayError> {
        let records = self.records_since(tenant_id, period.start(now)).await?;
        Ok(group_by(&records, |r| r.agent_id.clone()))
    }

    pub async fn by_model(&self, tenant_id: &TenantId, period: Period, now: DateTime<Utc>) -> Result<Vec<GroupedRow<ModelId>>, GatewayError> {
        let records = self.records_since(tenant_id, period.start(now)).await?;
        Ok(group_by(&records, |r| r.model_id.clone()))
    }

    pub async fn by_provider(&self, tenant_id: &TenantId, period: Period, now: DateTime<Utc>) -> Result<Vec<GroupedRow<ProviderId>>, GatewayError> {
        let records = self.records_since(tenant_id, period.start(now)).await?;
        Ok(group_by(&records, |r| r.provider_id.clone()))
    }

    /// Grouped by calendar day (UTC), oldest first.
    pub async fn by_day(&self, tenant_id: &TenantId, period: Period, now: DateTime<Utc>) -> Result<Vec<GroupedRow<String>>, GatewayError> {
        let records = self.records_since(tenant_id, period.start(now)).await?;
        let mut rows = group_by(&records, |r| r.created_at.date_naive().to_string());
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
    }

    /// Grouped by hour-of-day (UTC) for today only.
    pub async fn hourly_today(&self, tenant_id: &TenantId, now: DateTime<Utc>) -> Result<Vec<GroupedRow<u32>>, GatewayError> {
        let records = self.records_since(tenant_id, Period::Day.start(now)).await?;
        let mut rows = group_by(&records, |r| r.created_at.hour());
        rows.sort_by_key(|r| r.key);
        Ok(rows)
    }

    /// Rollup of usage in the last 5 minutes, for live dashboards.
    pub async fn real_time(&self, tenant_id: &TenantId, now: DateTime<Utc>) -> Result<Summary, GatewayError> {
        let records = self.records_since(tenant_id, now - Duration::minutes(5)).await?;
        let total_cost: Decimal = records.iter().map(|r| r.cost).sum();
        let total_tokens: u64 = records.iter().map(|r| r.total_tokens).sum();
        let total_requests = records.len() as u64;
        let avg_latency_ms = if total_requests == 0 {
            0.0
        } else {
            records.iter().map(|r| r.latency_ms as f64).sum::<f64>() / total_requests as f64
        };
        let succeeded = records.iter().filter(|r| r.succeeded).count() as f64;
        let success_rate = if total_requests == 0 { 1.0 } else { succeeded / total_requests as f64 };
        Ok(Summary {
            total_cost,
            total_tokens,
            total_requests,
            avg_latency_ms,
            success_rate,
            top_agents: top_n(&records, |r| r.agent_id.clone()),
            top_models: top_n(&records, |r| r.model_id.clone()),
            projected_month_end: None,
        })
    }
}

fn group_by<K: std::hash::Hash + Eq + Clone>(records: &[UsageRecord], key_fn: impl Fn(&UsageRecord) -> K) -> Vec<GroupedRow<K>> {
    let mut totals: HashMap<K, (Decimal, u64, u64)> = HashMap::new();
    let grand_total: Decimal = records.iter().map(|r| r.cost).sum();

    for record in records {
        let entry = totals.entry(key_fn(record)).or_insert((Decimal::ZERO, 0, 0));
        entry.0 += record.cost;
        entry.1 += record.total_tokens;
        entry.2 += 1;
    }

    totals
        .into_iter()
        .map(|(key, (cost, tokens, requests))| {
            let cost_share = if grand_total.is_zero() {
                0.0
            } else {
                (cost / grand_total).to_f64().unwrap_or(0.0)
            };
            GroupedRow { key, cost, tokens, requests, cost_share }
        })
        .collect()
}

fn top_n<K: std::hash::Hash + Eq + Clone>(records: &[UsageRecord], key_fn: impl Fn(&UsageRecord) -> K) -> Vec<(K, Decimal)> {
    let mut totals: HashMap<K, Decimal> = HashMap::new();
    for record in records {
        *totals.entry(key_fn(record)).or_insert(Decimal::ZERO) += record.cost;
    }
    let mut rows: Vec<(K, Decimal)> = totals.into_iter().collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1));
    rows.truncate(5);
    rows
}

fn days_in_month(year: i32, month: u32) -> i64 {
    let next_month_first = if month == 12 {
        Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single().unwrap()
    } else {
        Utc.with_ymd_and_hms(year, month + 1, 1, 0, 0, 0).single().unwrap()
    };
    let this_month_first = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single().unwrap();
    (next_month_first - this_month_first).num_days()
}
