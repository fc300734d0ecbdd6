use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A delivery channel the notification pipeline can route a message to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Log,
    Email,
    Webhook,
    WhatsApp,
}

/// A throttle record keyed by fingerprint, used to suppress duplicate
/// notifications within a dedup window (5 minutes by default).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationThrottleEntry {
    pub fingerprint: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub suppressed_count: u32,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&NotificationChannel::WhatsApp).unwrap(),
            "\"whats_app\""
        );
    }
}
