//! Gateway configuration loaded from environment variables, with typed
//! defaults matching the configuration keys enumerated in spec §6.4.

use std::time::Duration;

use anyhow::{Context, Result};
use llmgate_breaker::CircuitBreakerConfig;
use llmgate_notify::channel::{EmailConfig, WebhookConfig};
use llmgate_ratelimit::{RateLimitDefaults, ScopeLimits};

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        Some(value) => value
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        None => Ok(default),
    }
}

/// SMTP settings for the email notification channel. Absent unless every
/// required field is configured, in which case the email channel falls
/// back to a log-only stand-in.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

impl SmtpConfig {
    fn from_env() -> Result<Option<Self>> {
        let Some(host) = env_var("SMTP_HOST") else {
            return Ok(None);
        };
        let to = env_var("SMTP_TO")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();
        Ok(Some(Self {
            host,
            port: parse_env("SMTP_PORT", 587u16)?,
            username: env_var("SMTP_USERNAME").unwrap_or_default(),
            password: env_var("SMTP_PASSWORD").unwrap_or_default(),
            from: env_var("SMTP_FROM").unwrap_or_default(),
            to,
        }))
    }

    #[must_use]
    pub fn into_channel_config(self) -> EmailConfig {
        EmailConfig {
            smtp_host: self.host,
            smtp_port: self.port,
            username: self.username,
            password: self.password,
            from: self.from,
            to: self.to,
        }
    }
}

/// Webhook defaults for the webhook notification channel. Absent unless
/// `WEBHOOK_URL` is set.
#[derive(Debug, Clone)]
pub struct WebhookDefaults {
    pub url: String,
    pub hmac_secret: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl WebhookDefaults {
    fn from_env() -> Result<Option<Self>> {
        let Some(url) = env_var("WEBHOOK_URL") else {
            return Ok(None);
        };
        Ok(Some(Self {
            url,
            hmac_secret: env_var("WEBHOOK_HMAC_SECRET"),
            timeout: Duration::from_secs(parse_env("WEBHOOK_TIMEOUT_SECONDS", 10u64)?),
            max_retries: parse_env("WEBHOOK_MAX_RETRIES", 3u32)?,
        }))
    }

    #[must_use]
    pub fn into_channel_config(self) -> WebhookConfig {
        WebhookConfig {
            url: self.url,
            hmac_secret: self.hmac_secret,
            headers: Vec::new(),
            timeout: self.timeout,
            max_retries: self.max_retries,
        }
    }
}

/// Top-level gateway configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub supervisor_cron: String,
    pub supervisor_timezone: chrono_tz::Tz,
    pub token_estimate_chars_per_token: u32,
    pub notification_throttle_seconds: u64,
    pub circuit: CircuitBreakerConfig,
    pub rate_limits: RateLimitDefaults,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let supervisor_timezone_name = env_var("SUPERVISOR_TIMEZONE").unwrap_or_else(|| "UTC".to_string());
        let supervisor_timezone: chrono_tz::Tz = supervisor_timezone_name
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid SUPERVISOR_TIMEZONE: {e}"))?;

        Ok(Self {
            bind_addr: env_var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            supervisor_cron: env_var("SUPERVISOR_CRON").unwrap_or_else(|| "*/5 * * * *".to_string()),
            supervisor_timezone,
            token_estimate_chars_per_token: parse_env("TOKEN_ESTIMATE_CHARS_PER_TOKEN", 4u32)?,
            notification_throttle_seconds: parse_env("NOTIFICATION_THROTTLE_SECONDS", 300u64)?,
            circuit: CircuitBreakerConfig {
                failure_threshold: parse_env("CIRCUIT_FAILURE_THRESHOLD", 5u32)?,
                success_threshold: parse_env("CIRCUIT_SUCCESS_THRESHOLD", 3u32)?,
                open_timeout: Duration::from_secs(parse_env("CIRCUIT_OPEN_TIMEOUT_SECONDS", 60u64)?),
                half_open_timeout: Duration::from_secs(parse_env("CIRCUIT_HALF_OPEN_TIMEOUT_SECONDS", 30u64)?),
            },
            rate_limits: RateLimitDefaults {
                tenant: ScopeLimits {
                    requests_per_minute: Some(parse_env("TENANT_REQUESTS_PER_MINUTE", 100u32)?),
                    tokens_per_minute: Some(parse_env("TENANT_TOKENS_PER_MINUTE", 100_000u64)?),
                    requests_per_day: Some(parse_env("TENANT_REQUESTS_PER_DAY", 5_000u32)?),
                    max_concurrency: None,
                },
                agent: ScopeLimits {
                    requests_per_minute: Some(parse_env("AGENT_REQUESTS_PER_MINUTE", 20u32)?),
                    tokens_per_minute: Some(parse_env("AGENT_TOKENS_PER_MINUTE", 50_000u64)?),
                    requests_per_day: None,
                    max_concurrency: None,
                },
                provider: ScopeLimits {
                    requests_per_minute: Some(parse_env("PROVIDER_REQUESTS_PER_MINUTE", 60u32)?),
                    tokens_per_minute: None,
                    requests_per_day: None,
                    max_concurrency: Some(parse_env("PROVIDER_MAX_CONCURRENCY", 5u32)?),
                },
            },
        })
    }

    pub fn smtp() -> Result<Option<SmtpConfig>> {
        SmtpConfig::from_env().context("loading SMTP configuration")
    }

    pub fn webhook() -> Result<Option<WebhookDefaults>> {
        WebhookDefaults::from_env().context("loading webhook configuration")
    }
}
