//! Webhook notifications
//!
//! Fire-and-forget delivery of operational events. A delivery failure is
//! logged, never raised; notification problems must not block trading.

use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::NotificationConfig;

pub struct Notifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(config: &NotificationConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            webhook_url: config.webhook_url.clone(),
            client,
        }
    }

    /// Post `{message, level, timestamp, data}` to the webhook, if one is
    /// configured. Returns whether delivery succeeded.
    pub async fn notify(&self, message: &str, level: &str, data: Value) -> bool {
        let Some(url) = &self.webhook_url else {
            return false;
        };

        let payload = serde_json::json!({
            "message": message,
            "level": level,
            "timestamp": chrono::Utc::now().timestamp(),
            "data": data,
        });

        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("notification delivered: {}", message);
                true
            }
            Ok(response) => {
                warn!("notification rejected with {}: {}", response.status(), message);
                false
            }
            Err(e) => {
                warn!("notification delivery failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_webhook_is_a_noop() {
        let notifier = Notifier::new(&NotificationConfig {
            webhook_url: None,
            timeout_ms: 1000,
        });
        assert!(!notifier.notify("hello", "info", Value::Null).await);
    }

    #[tokio::test]
    async fn test_unreachable_webhook_does_not_error() {
        let notifier = Notifier::new(&NotificationConfig {
            webhook_url: Some("http://127.0.0.1:1/unreachable".into()),
            timeout_ms: 200,
        });
        // Failure is swallowed and reported as false
        assert!(!notifier.notify("hello", "error", Value::Null).await);
    }
}
