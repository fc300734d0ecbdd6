use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::TenantId;

/// The kind of budget condition an alert was raised for, and the
/// accounting period it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    BudgetWarning,
    BudgetCritical,
    BudgetExceeded,
    DailyWarning,
    DailyExceeded,
}

/// Severity routed to the notification pipeline's channel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// A usage alert raised for a tenant. At most one unacknowledged alert may
/// exist per `(tenant_id, alert_type, threshold, period)` tuple; the usage
/// tracker enforces this before creating a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageAlert {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    /// The threshold fraction that triggered this alert, e.g. `0.10` for a
    /// 10%-remaining warning.
    pub threshold: Decimal,
    /// Fraction of budget consumed at the time the alert was raised.
    pub percent_used: Decimal,
    /// Period key the alert belongs to, e.g. a month key `"2026-07"` for
    /// budget alerts or a day key `"2026-07-27"` for daily alerts. Used to
    /// scope the one-unacknowledged-per-period invariant.
    pub period: String,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AlertType {
    /// Severity this alert type is routed to, per the tracker's fixed
    /// mapping: exceeded states and critical (<=5% remaining) crossings are
    /// `Critical`, the rest are `Warning`.
    #[must_use]
    pub fn default_severity(self) -> AlertSeverity {
        match self {
            AlertType::BudgetExceeded | AlertType::DailyExceeded | AlertType::BudgetCritical => {
                AlertSeverity::Critical
            }
            AlertType::BudgetWarning | AlertType::DailyWarning => AlertSeverity::Warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exceeded_types_are_critical() {
        assert_eq!(
            AlertType::BudgetExceeded.default_severity(),
            AlertSeverity::Critical
        );
        assert_eq!(
            AlertType::DailyExceeded.default_severity(),
            AlertSeverity::Critical
        );
    }

    #[test]
    fn budget_critical_is_critical_not_error() {
        assert_eq!(
            AlertType::BudgetCritical.default_severity(),
            AlertSeverity::Critical
        );
    }

    #[test]
    fn severity_ordering_allows_comparison() {
        assert!(AlertSeverity::Critical > AlertSeverity::Warning);
        assert!(AlertSeverity::Warning > AlertSeverity::Info);
    }
}
