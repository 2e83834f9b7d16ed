use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::webhook::{deliver, http_client};
use super::{Alert, ErrorNotifier, NotificationReceipt};
use crate::error::{ComponentResult, ErrorRecord, Severity};
use crate::registry::Component;

/// Posts to a Slack-compatible incoming webhook.
#[derive(Debug, Clone)]
pub struct ChatNotifier {
    name: String,
    priority: i32,
    webhook_url: String,
    channel: Option<String>,
    username: String,
    min_severity: Severity,
    client: Client,
}

impl ChatNotifier {
    pub const DEFAULT_NAME: &'static str = "chat";

    pub fn new(webhook_url: impl Into<String>) -> ComponentResult<Self> {
        Ok(Self {
            name: Self::DEFAULT_NAME.to_string(),
            priority: 0,
            webhook_url: webhook_url.into(),
            channel: None,
            username: "faultbus".to_string(),
            min_severity: Severity::Medium,
            client: http_client(Duration::from_secs(10))?,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    /// Incoming-webhook payload for an alert.
    pub fn payload(&self, alert: &Alert) -> Value {
        let mut fields = vec![
            json!({ "title": "Type", "value": alert.error_type.as_str(), "short": true }),
            json!({ "title": "Code", "value": alert.code, "short": true }),
            json!({ "title": "Error ID", "value": alert.error_id, "short": false }),
        ];
        if let Some(tenant) = &alert.tenant_id {
            fields.push(json!({ "title": "Tenant", "value": tenant, "short": true }));
        }

        let mut payload = json!({
            "username": self.username,
            "text": alert.title(),
            "attachments": [{
                "color": alert.color(),
                "text": alert.message,
                "fields": fields,
                "ts": alert.occurred_at.timestamp(),
            }],
        });
        if let Some(channel) = &self.channel {
            payload["channel"] = json!(channel);
        }
        payload
    }
}

impl Component for ChatNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[async_trait]
impl ErrorNotifier for ChatNotifier {
    fn min_severity(&self) -> Severity {
        self.min_severity
    }

    async fn notify(&self, record: &ErrorRecord) -> ComponentResult<NotificationReceipt> {
        let payload = self.payload(&Alert::from_record(record));
        let request = self
            .client
            .post(&self.webhook_url)
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&payload)?);

        let status = deliver(request).await?;
        Ok(NotificationReceipt::new("chat").with_reference(status.as_u16().to_string()))
    }
}
