//! Notification Pipeline: severity-routed, throttled, multi-channel alert
//! dispatch.
//!
//! Routing table (alert severity -> channels): `Info` logs only, `Warning`
//! sends email, `Error` sends email + webhook, `Critical` sends email +
//! WhatsApp + webhook. Every dispatch is deduplicated by fingerprint for
//! five minutes and gated by the tenant's quiet-hours/business-hours
//! schedule.

pub mod channel;
pub mod schedule;
pub mod template;
pub mod throttle;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use llmgate_core::{AlertSeverity, UsageAlert};
use tracing::{info, warn};

pub use channel::{DeliveryResult, NotificationChannel, RenderedNotification};
pub use schedule::NotificationSchedule;
pub use template::{Context, Value};
pub use throttle::NotificationThrottle;

/// A notification about to be dispatched, independent of the alert that
/// triggered it — also used for supervisor-originated notifications
/// (`BOT_SLOW`, `BOT_DOWN`, `BOT_RECOVERED`) that aren't `UsageAlert`s.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub admin_agent_id: String,
    pub bot_id: Option<String>,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub rendered: RenderedNotification,
}

/// Channels configured per severity, keyed by the severity they're wired
/// to respond to. A severity absent from the map gets no dispatch.
pub struct ChannelRouter {
    log: Arc<dyn NotificationChannel>,
    email: Arc<dyn NotificationChannel>,
    webhook: Arc<dyn NotificationChannel>,
    whatsapp: Arc<dyn NotificationChannel>,
}

impl ChannelRouter {
    #[must_use]
    pub fn new(
        log: Arc<dyn NotificationChannel>,
        email: Arc<dyn NotificationChannel>,
        webhook: Arc<dyn NotificationChannel>,
        whatsapp: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self { log, email, webhook, whatsapp }
    }

    /// Channels this severity fans out to, per the fixed routing table.
    #[must_use]
    pub fn channels_for(&self, severity: AlertSeverity) -> Vec<(&'static str, Arc<dyn NotificationChannel>)> {
        match severity {
            AlertSeverity::Info => vec![("log", self.log.clone())],
            AlertSeverity::Warning => vec![("email", self.email.clone())],
            AlertSeverity::Error => vec![("email", self.email.clone()), ("webhook", self.webhook.clone())],
            AlertSeverity::Critical => vec![
                ("email", self.email.clone()),
                ("whatsapp", self.whatsapp.clone()),
                ("webhook", self.webhook.clone()),
            ],
        }
    }
}

/// Per-channel delivery outcome, surfaced back to the caller for
/// persistence against the originating alert's sent-flags.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub throttled: bool,
    pub channel_results: HashMap<&'static str, DeliveryResult>,
}

impl DispatchOutcome {
    #[must_use]
    pub fn any_succeeded(&self) -> bool {
        self.channel_results.values().any(|r| r.success)
    }
}

pub struct NotificationPipeline {
    router: ChannelRouter,
    throttle: NotificationThrottle,
}

impl NotificationPipeline {
    #[must_use]
    pub fn new(router: ChannelRouter, throttle: NotificationThrottle) -> Self {
        Self { router, throttle }
    }

    /// Dispatch one notification: check the throttle, fan out to every
    /// channel for its severity in parallel, then record a send on the
    /// throttle store if at least one channel succeeded.
    pub async fn dispatch(
        &self,
        request: &NotificationRequest,
        schedule: &NotificationSchedule,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        let is_critical = request.severity == AlertSeverity::Critical;
        if !schedule.should_notify_now(now, is_critical) {
            info!(title = %request.title, "notification deferred by schedule");
            return DispatchOutcome { throttled: true, channel_results: HashMap::new() };
        }

        let fingerprint = throttle::fingerprint(
            &request.admin_agent_id,
            parse_alert_type(&request.alert_type),
            request.severity,
            request.bot_id.as_deref(),
            &request.title,
        );

        match self.throttle.is_throttled(&fingerprint).await {
            Ok(true) => {
                return DispatchOutcome { throttled: true, channel_results: HashMap::new() };
            }
            Err(e) => {
                warn!(error = %e, "failed to check notification throttle, dispatching anyway");
            }
            Ok(false) => {}
        }

        let channels = self.router.channels_for(request.severity);
        let sends = channels.iter().map(|(name, channel)| {
            let channel = channel.clone();
            let rendered = request.rendered.clone();
            async move { (*name, channel.send(&rendered).await) }
        });
        let results: HashMap<&'static str, DeliveryResult> = join_all(sends).await.into_iter().collect();

        let outcome = DispatchOutcome { throttled: false, channel_results: results };
        if outcome.any_succeeded() {
            if let Err(e) = self.throttle.record_sent(&fingerprint, now).await {
                warn!(error = %e, "failed to record notification throttle");
            }
        }
        outcome
    }
}

/// The alert type string is opaque to the pipeline (it also dispatches
/// supervisor-originated notifications that aren't `UsageAlert`s), but the
/// fingerprint only needs it to distinguish notification kinds, not to
/// round-trip through `AlertType` parsing machinery.
fn parse_alert_type(raw: &str) -> llmgate_core::AlertType {
    match raw {
        "budget_critical" => llmgate_core::AlertType::BudgetCritical,
        "budget_exceeded" => llmgate_core::AlertType::BudgetExceeded,
        "daily_warning" => llmgate_core::AlertType::DailyWarning,
        "daily_exceeded" => llmgate_core::AlertType::DailyExceeded,
        _ => llmgate_core::AlertType::BudgetWarning,
    }
}

/// Render the canonical budget-alert template for a `UsageAlert`, used by
/// the usage tracker / alert engine before handing the notification to the
/// pipeline.
#[must_use]
pub fn render_budget_alert(alert: &UsageAlert, tenant_name: &str) -> RenderedNotification {
    let severity = alert.severity;
    let mut ctx = Context::new();
    ctx.insert("tenant".to_string(), Value::from(tenant_name));
    ctx.insert("period".to_string(), Value::from(alert.period.clone()));
    ctx.insert(
        "percent_used".to_string(),
        Value::from(format!("{:.1}", alert.percent_used * rust_decimal::Decimal::from(100))),
    );
    ctx.insert(
        "remaining_percent".to_string(),
        Value::from(format!(
            "{:.1}",
            (rust_decimal::Decimal::ONE - alert.percent_used) * rust_decimal::Decimal::from(100)
        )),
    );

    let template = match severity {
        AlertSeverity::Critical | AlertSeverity::Error => {
            "Budget alert for {{tenant}}: {{percent_used}}% of the {{period}} budget used ({{remaining_percent}}% remaining)."
        }
        _ => "Heads up for {{tenant}}: {{percent_used}}% of the {{period}} budget used ({{remaining_percent}}% remaining).",
    };

    let prefix = channel::subject_prefix(severity);
    RenderedNotification {
        subject: format!("{prefix} Budget alert — {tenant_name}"),
        text_body: template::render(template, &ctx),
        html_body: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llmgate_state_memory::MemoryStateStore;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    struct RecordingChannel {
        result: DeliveryResult,
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        async fn send(&self, _notification: &RenderedNotification) -> DeliveryResult {
            self.result.clone()
        }
    }

    fn pipeline(all_succeed: bool) -> NotificationPipeline {
        let result = if all_succeed { DeliveryResult::ok() } else { DeliveryResult::failed("boom") };
        let channel: Arc<dyn NotificationChannel> = Arc::new(RecordingChannel { result });
        let router = ChannelRouter::new(channel.clone(), channel.clone(), channel.clone(), channel);
        let throttle = NotificationThrottle::new(Arc::new(MemoryStateStore::new()));
        NotificationPipeline::new(router, throttle)
    }

    fn request(severity: AlertSeverity) -> NotificationRequest {
        NotificationRequest {
            admin_agent_id: "aa-1".to_string(),
            bot_id: None,
            alert_type: "budget_warning".to_string(),
            severity,
            title: "Budget warning".to_string(),
            rendered: RenderedNotification {
                subject: "Budget warning".to_string(),
                text_body: "body".to_string(),
                html_body: None,
            },
        }
    }

    #[tokio::test]
    async fn info_severity_only_dispatches_log_channel() {
        let pipeline = pipeline(true);
        let outcome = pipeline
            .dispatch(&request(AlertSeverity::Info), &NotificationSchedule::default(), Utc::now())
            .await;
        assert_eq!(outcome.channel_results.len(), 1);
        assert!(outcome.channel_results.contains_key("log"));
    }

    #[tokio::test]
    async fn critical_severity_dispatches_three_channels() {
        let pipeline = pipeline(true);
        let outcome = pipeline
            .dispatch(&request(AlertSeverity::Critical), &NotificationSchedule::default(), Utc::now())
            .await;
        assert_eq!(outcome.channel_results.len(), 3);
        assert!(outcome.channel_results.contains_key("whatsapp"));
    }

    #[tokio::test]
    async fn budget_critical_alert_reaches_whatsapp() {
        let pipeline = pipeline(true);
        let mut request = request(AlertSeverity::Critical);
        request.alert_type = "budget_critical".to_string();
        let outcome = pipeline.dispatch(&request, &NotificationSchedule::default(), Utc::now()).await;
        assert!(outcome.channel_results.contains_key("whatsapp"));
    }

    #[tokio::test]
    async fn second_dispatch_within_ttl_is_throttled() {
        let pipeline = pipeline(true);
        let now = Utc::now();
        let first = pipeline.dispatch(&request(AlertSeverity::Warning), &NotificationSchedule::default(), now).await;
        assert!(!first.throttled);

        let second = pipeline.dispatch(&request(AlertSeverity::Warning), &NotificationSchedule::default(), now).await;
        assert!(second.throttled);
    }

    #[tokio::test]
    async fn throttle_not_recorded_when_every_channel_fails() {
        let pipeline = pipeline(false);
        let now = Utc::now();
        pipeline.dispatch(&request(AlertSeverity::Warning), &NotificationSchedule::default(), now).await;

        let second = pipeline.dispatch(&request(AlertSeverity::Warning), &NotificationSchedule::default(), now).await;
        assert!(!second.throttled, "a fully-failed dispatch must not suppress the retry");
    }

    #[tokio::test]
    async fn schedule_defers_non_critical_outside_window() {
        let pipeline = pipeline(true);
        let schedule = NotificationSchedule {
            business_hours: Some(schedule::TimeWindow {
                start: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end: chrono::NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            }),
            except_critical: false,
            ..Default::default()
        };
        let outside_hours = chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 7, 27, 22, 0, 0).unwrap();
        let outcome = pipeline.dispatch(&request(AlertSeverity::Warning), &schedule, outside_hours).await;
        assert!(outcome.throttled);
        assert!(outcome.channel_results.is_empty());
    }

    #[test]
    fn budget_alert_template_renders_percentages() {
        let alert = UsageAlert {
            id: Uuid::new_v4(),
            tenant_id: llmgate_core::TenantId::from("t1"),
            alert_type: llmgate_core::AlertType::BudgetWarning,
            severity: AlertSeverity::Warning,
            threshold: Decimal::new(20, 2),
            percent_used: Decimal::new(80, 2),
            period: "2026-07".to_string(),
            acknowledged: false,
            acknowledged_at: None,
            created_at: Utc::now(),
        };
        let rendered = render_budget_alert(&alert, "Acme");
        assert!(rendered.text_body.contains("80.0%"));
        assert!(rendered.text_body.contains("20.0%"));
        assert!(rendered.subject.contains("WARNING"));
    }
}
