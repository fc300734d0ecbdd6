//! Delivery channels dispatched by the notification pipeline.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// A rendered notification ready for channel dispatch.
#[derive(Debug, Clone)]
pub struct RenderedNotification {
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
}

/// Result of one channel's delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub success: bool,
    pub error: Option<String>,
}

impl DeliveryResult {
    #[must_use]
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()) }
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, notification: &RenderedNotification) -> DeliveryResult;
}

/// Logs the notification at the appropriate tracing level; always
/// succeeds, matching the spec's "INFO -> log only" routing where log
/// delivery can never itself fail a dispatch.
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn send(&self, notification: &RenderedNotification) -> DeliveryResult {
        debug!(subject = %notification.subject, "notification logged");
        DeliveryResult::ok()
    }
}

/// Subject prefix applied per severity ahead of the template's own subject.
#[must_use]
pub fn subject_prefix(severity: llmgate_core::AlertSeverity) -> &'static str {
    match severity {
        llmgate_core::AlertSeverity::Critical => "\u{1F6A8} CRITICAL",
        llmgate_core::AlertSeverity::Error => "\u{1F6A8} CRITICAL",
        llmgate_core::AlertSeverity::Warning => "\u{26A0}\u{FE0F} WARNING",
        llmgate_core::AlertSeverity::Info => "\u{2139}\u{FE0F} INFO",
    }
}

pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

pub struct EmailChannel {
    config: EmailConfig,
}

impl EmailChannel {
    #[must_use]
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    async fn send(&self, notification: &RenderedNotification) -> DeliveryResult {
        let transport = match AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host) {
            Ok(builder) => builder
                .port(self.config.smtp_port)
                .credentials(Credentials::new(self.config.username.clone(), self.config.password.clone()))
                .build(),
            Err(e) => return DeliveryResult::failed(format!("smtp transport error: {e}")),
        };

        for recipient in &self.config.to {
            let message = Message::builder()
                .from(match self.config.from.parse() {
                    Ok(addr) => addr,
                    Err(e) => return DeliveryResult::failed(format!("invalid from address: {e}")),
                })
                .to(match recipient.parse() {
                    Ok(addr) => addr,
                    Err(e) => return DeliveryResult::failed(format!("invalid recipient {recipient}: {e}")),
                })
                .subject(&notification.subject)
                .header(ContentType::TEXT_PLAIN)
                .body(notification.text_body.clone());

            let message = match message {
                Ok(m) => m,
                Err(e) => return DeliveryResult::failed(format!("failed to build message: {e}")),
            };

            if let Err(e) = transport.send(message).await {
                warn!(error = %e, recipient = %recipient, "email delivery failed");
                return DeliveryResult::failed(e.to_string());
            }
        }
        DeliveryResult::ok()
    }
}

/// JSON body posted to a webhook endpoint.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    timestamp: String,
    alert: WebhookAlert<'a>,
    metadata: serde_json::Value,
    source: &'static str,
}

#[derive(Debug, Serialize)]
struct WebhookAlert<'a> {
    #[serde(rename = "type")]
    alert_type: &'a str,
    severity: &'a str,
    title: &'a str,
    message: &'a str,
}

pub struct WebhookConfig {
    pub url: String,
    pub hmac_secret: Option<String>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            hmac_secret: None,
            headers: Vec::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

pub struct WebhookChannel {
    config: WebhookConfig,
    client: reqwest::Client,
    alert_type: String,
    severity: String,
}

impl WebhookChannel {
    #[must_use]
    pub fn new(config: WebhookConfig, alert_type: String, severity: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client, alert_type, severity }
    }

    fn sign(secret: &str, body: &[u8]) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(body);
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// Whether a response/condition should be retried, per the spec's
    /// webhook retry policy: network errors, HTTP 5xx, and HTTP 429.
    fn is_retryable_status(status: u16) -> bool {
        status == 429 || (500..600).contains(&status)
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, notification: &RenderedNotification) -> DeliveryResult {
        let payload = WebhookPayload {
            timestamp: chrono::Utc::now().to_rfc3339(),
            alert: WebhookAlert {
                alert_type: &self.alert_type,
                severity: &self.severity,
                title: &notification.subject,
                message: &notification.text_body,
            },
            metadata: serde_json::Value::Null,
            source: "llmgate",
        };
        let Ok(body) = serde_json::to_vec(&payload) else {
            return DeliveryResult::failed("failed to serialize webhook payload");
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.client.post(&self.config.url).header("Content-Type", "application/json").body(body.clone());
            for (name, value) in &self.config.headers {
                request = request.header(name, value);
            }
            if let Some(secret) = &self.config.hmac_secret {
                if let Some(signature) = Self::sign(secret, &body) {
                    request = request.header("X-Signature-256", format!("sha256={signature}"));
                }
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if (200..300).contains(&status) {
                        return DeliveryResult::ok();
                    }
                    if !Self::is_retryable_status(status) || attempt > self.config.max_retries {
                        return DeliveryResult::failed(format!("webhook returned status {status}"));
                    }
                }
                Err(e) => {
                    if attempt > self.config.max_retries {
                        return DeliveryResult::failed(e.to_string());
                    }
                }
            }

            let backoff_secs = 2u64.saturating_pow(attempt.min(5)).min(30);
            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
        }
    }
}

/// WhatsApp transport stub: formats the message and normalizes the
/// recipient to E.164, but the actual send is left to the transport
/// client injected at construction, matching the spec's exclusion of
/// WhatsApp transport internals from the core implementation.
pub struct WhatsAppChannel {
    recipient_e164: String,
    sender: Box<dyn WhatsAppSender>,
}

#[async_trait]
pub trait WhatsAppSender: Send + Sync {
    async fn send_message(&self, to: &str, body: &str) -> Result<(), String>;
}

impl WhatsAppChannel {
    #[must_use]
    pub fn new(recipient_e164: impl Into<String>, sender: Box<dyn WhatsAppSender>) -> Self {
        Self { recipient_e164: normalize_e164(recipient_e164.into()), sender }
    }
}

/// Strip everything but digits and prefix with `+`, a minimal E.164
/// normalization sufficient for the gateway's own validation, not a full
/// phone-number library.
fn normalize_e164(raw: String) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    format!("+{digits}")
}

#[async_trait]
impl NotificationChannel for WhatsAppChannel {
    async fn send(&self, notification: &RenderedNotification) -> DeliveryResult {
        let body = format!("*{}*\n\n{}", notification.subject, notification.text_body);

        let mut attempt = 0;
        let delays = [1u64, 2, 4];
        loop {
            match self.sender.send_message(&self.recipient_e164, &body).await {
                Ok(()) => return DeliveryResult::ok(),
                Err(e) => {
                    if attempt >= delays.len() {
                        return DeliveryResult::failed(e);
                    }
                    tokio::time::sleep(Duration::from_secs(delays[attempt].min(30))).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_phone_number_to_e164() {
        assert_eq!(normalize_e164("+1 (555) 123-4567".to_string()), "+15551234567");
    }

    #[test]
    fn retryable_statuses_match_spec() {
        assert!(WebhookChannel::is_retryable_status(429));
        assert!(WebhookChannel::is_retryable_status(503));
        assert!(!WebhookChannel::is_retryable_status(404));
        assert!(!WebhookChannel::is_retryable_status(200));
    }

    struct AlwaysFails;

    #[async_trait]
    impl WhatsAppSender for AlwaysFails {
        async fn send_message(&self, _to: &str, _body: &str) -> Result<(), String> {
            Err("simulated failure".to_string())
        }
    }

    struct Succeeds;

    #[async_trait]
    impl WhatsAppSender for Succeeds {
        async fn send_message(&self, _to: &str, _body: &str) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn whatsapp_channel_succeeds_without_retry() {
        let channel = WhatsAppChannel::new("+1 555 0100", Box::new(Succeeds));
        let notification = RenderedNotification {
            subject: "Test".to_string(),
            text_body: "body".to_string(),
            html_body: None,
        };
        let result = channel.send(&notification).await;
        assert!(result.success);
    }

    #[tokio::test(start_paused = true)]
    async fn whatsapp_channel_retries_then_gives_up() {
        let channel = WhatsAppChannel::new("+1 555 0100", Box::new(AlwaysFails));
        let notification = RenderedNotification {
            subject: "Test".to_string(),
            text_body: "body".to_string(),
            html_body: None,
        };
        let result = channel.send(&notification).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("simulated failure"));
    }
}
