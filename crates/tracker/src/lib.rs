//! Usage Tracker & Alert Engine.
//!
//! `write_usage` persists an append-only usage record and then evaluates the
//! tenant's budget thresholds; threshold evaluation failures are logged, not
//! surfaced, so a broken alert check can never fail a completion that has
//! already succeeded.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};
use llmgate_core::{
    day_key, month_key, next_day_start, next_month_start, AlertSeverity, AlertType, GatewayError,
    Tenant, UsageAlert, UsageRecord,
};
use llmgate_store::{AlertStore, Query, UsageStore};
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

/// A threshold crossing ready to become an alert and a notification.
#[derive(Debug, Clone)]
pub struct AlertOutcome {
    pub alert: UsageAlert,
    pub is_new: bool,
}

/// Tenant mutation requested as a side effect of budget enforcement
/// (suspension on exceeding budget with `suspend_on_exceed` set). The
/// tracker does not own tenant persistence, so it reports the requested
/// mutation back to the caller instead of writing it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantMutation {
    Suspend,
}

pub struct UsageTracker {
    usage_store: Arc<dyn UsageStore>,
    alert_store: Arc<dyn AlertStore>,
}

impl UsageTracker {
    #[must_use]
    pub fn new(usage_store: Arc<dyn UsageStore>, alert_store: Arc<dyn AlertStore>) -> Self {
        Self {
            usage_store,
            alert_store,
        }
    }

    /// Persist a usage record and evaluate budget alerts for its tenant.
    /// Alert-check failures are logged and swallowed, matching the
    /// contract that usage recording must never fail a completed (or
    /// failed-but-already-dispatched) call on the caller's behalf.
    pub async fn write_usage(
        &self,
        record: UsageRecord,
        tenant: &Tenant,
    ) -> Result<(Vec<AlertOutcome>, Option<TenantMutation>), GatewayError> {
        self.usage_store.record(record.clone()).await?;

        match self.check_and_create_alerts(tenant, record.created_at).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(tenant = %tenant.id, error = %e, "alert check failed after usage write");
                Ok((Vec::new(), None))
            }
        }
    }

    /// Total cost of all usage records for `tenant` since `since`. Public
    /// so callers (the rate limiter's budget pre-check) can reuse the
    /// same accounting the alert engine uses.
    pub async fn cost_since(&self, tenant: &Tenant, since: DateTime<Utc>) -> Result<Decimal, GatewayError> {
        let page = self
            .usage_store
            .query(&Query {
                tenant_id: Some(tenant.id.clone()),
                from: Some(since),
                to: None,
                limit: Some(1000),
                offset: None,
            })
            .await?;
        Ok(page.records.iter().map(|r| r.cost).sum())
    }

    /// Evaluate monthly and daily budgets against accumulated cost,
    /// creating at most one alert per scope per invocation (the most
    /// severe threshold crossed), plus a one-time exceeded alert per
    /// scope if the budget has been fully consumed.
    pub async fn check_and_create_alerts(
        &self,
        tenant: &Tenant,
        now: DateTime<Utc>,
    ) -> Result<(Vec<AlertOutcome>, Option<TenantMutation>), GatewayError> {
        let mut outcomes = Vec::new();
        let mut mutation = None;

        let monthly_used = self.cost_since(tenant, month_start(now)).await?;
        if let Some(outcome) = self
            .evaluate_scope(
                tenant,
                monthly_used,
                tenant.monthly_budget,
                &month_key(now),
                AlertType::BudgetWarning,
                AlertType::BudgetCritical,
                AlertType::BudgetExceeded,
                now,
            )
            .await?
        {
            if outcome.alert.alert_type == AlertType::BudgetExceeded && tenant.suspend_on_exceed {
                mutation = Some(TenantMutation::Suspend);
            }
            outcomes.push(outcome);
        }

        if let Some(daily_budget) = tenant.daily_budget {
            let daily_used = self.cost_since(tenant, day_start(now)).await?;
            if let Some(outcome) = self
                .evaluate_scope(
                    tenant,
                    daily_used,
                    Some(daily_budget),
                    &day_key(now),
                    AlertType::DailyWarning,
                    AlertType::DailyWarning,
                    AlertType::DailyExceeded,
                    now,
                )
                .await?
            {
                if outcome.alert.alert_type == AlertType::DailyExceeded && tenant.suspend_on_exceed {
                    mutation = Some(TenantMutation::Suspend);
                }
                outcomes.push(outcome);
            }
        }

        Ok((outcomes, mutation))
    }

    /// Evaluate one budget scope (monthly or daily) against the tenant's
    /// configured threshold list, emitting the single most severe crossing
    /// plus a separate one-time exceeded alert if the budget is fully
    /// consumed.
    #[allow(clippy::too_many_arguments)]
    async fn evaluate_scope(
        &self,
        tenant: &Tenant,
        used: Decimal,
        limit: Option<Decimal>,
        period: &str,
        warning_type: AlertType,
        critical_type: AlertType,
        exceeded_type: AlertType,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertOutcome>, GatewayError> {
        let Some(limit) = limit else {
            return Ok(None);
        };
        if limit <= Decimal::ZERO {
            return Ok(None);
        }

        let percent_used = (used / limit).min(Decimal::ONE);

        if used >= limit {
            return self
                .maybe_create(tenant, exceeded_type, Decimal::ZERO, percent_used, period, now)
                .await;
        }

        let remaining = Decimal::ONE - percent_used;
        let mut thresholds: Vec<Decimal> = tenant.alert_thresholds.0.clone();
        thresholds.sort_by(|a, b| b.cmp(a));

        for threshold in thresholds {
            if remaining <= threshold {
                let alert_type = if threshold <= Decimal::new(1, 2) || threshold <= Decimal::new(5, 2) {
                    critical_type
                } else {
                    warning_type
                };
                return self
                    .maybe_create(tenant, alert_type, threshold, percent_used, period, now)
                    .await;
            }
        }

        Ok(None)
    }

    async fn maybe_create(
        &self,
        tenant: &Tenant,
        alert_type: AlertType,
        threshold: Decimal,
        percent_used: Decimal,
        period: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertOutcome>, GatewayError> {
        if let Some(existing) = self
            .alert_store
            .find_unacknowledged(&tenant.id, alert_type, threshold, period)
            .await?
        {
            return Ok(Some(AlertOutcome {
                alert: existing,
                is_new: false,
            }));
        }

        let severity = severity_for(alert_type, threshold);
        let alert = UsageAlert {
            id: Uuid::new_v4(),
            tenant_id: tenant.id.clone(),
            alert_type,
            severity,
            threshold,
            percent_used,
            period: period.to_string(),
            acknowledged: false,
            acknowledged_at: None,
            created_at: now,
        };
        self.alert_store.create(alert.clone()).await?;
        Ok(Some(AlertOutcome { alert, is_new: true }))
    }
}

/// Severity mapping per the threshold scheme: thresholds at or below 5%
/// remaining are critical (1% also implies the exceeded type, already
/// routed by the caller), 10%/20% remaining are warnings.
fn severity_for(alert_type: AlertType, threshold: Decimal) -> AlertSeverity {
    if matches!(alert_type, AlertType::BudgetExceeded | AlertType::DailyExceeded) {
        return AlertSeverity::Critical;
    }
    if threshold <= Decimal::new(5, 2) {
        AlertSeverity::Critical
    } else {
        AlertSeverity::Warning
    }
}

pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_day0(0)
        .and_then(|d| d.with_hour(0))
        .and_then(|d| d.with_minute(0))
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(now)
}

pub fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    next_day_start(now) - chrono::Duration::days(1)
}
