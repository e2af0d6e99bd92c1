//! Generic JSON webhook backend

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::{Notifier, ServerEvent};

/// POSTs each event as a JSON document to a single URL.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, event: &ServerEvent) -> Result<(), String> {
        let payload = json!({
            "event": event.event_type(),
            "message": event.message(),
            "data": event,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("webhook returned {}", response.status()));
        }
        Ok(())
    }
}
