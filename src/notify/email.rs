use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{Alert, ErrorNotifier, NotificationReceipt};
use crate::error::{ComponentError, ComponentResult, ErrorRecord, Severity};
use crate::registry::Component;

/// A rendered e-mail ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Delivers rendered e-mails (SMTP relay, provider API, ...).
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Sends the message and returns a transport message id.
    async fn send(&self, message: &EmailMessage) -> ComponentResult<String>;
}

/// Transport that only logs the message. Useful in development.
#[derive(Debug, Clone, Default)]
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn send(&self, message: &EmailMessage) -> ComponentResult<String> {
        let id = Uuid::new_v4().to_string();
        info!(
            message_id = %id,
            to = %message.to.join(","),
            subject = %message.subject,
            "Email notification (log transport)"
        );
        Ok(id)
    }
}

/// Renders an alert e-mail and hands it to a [`MailTransport`].
pub struct EmailNotifier {
    name: String,
    priority: i32,
    from: String,
    recipients: Vec<String>,
    subject_prefix: String,
    min_severity: Severity,
    transport: Arc<dyn MailTransport>,
}

impl EmailNotifier {
    pub const DEFAULT_NAME: &'static str = "email";

    pub fn new(
        from: impl Into<String>,
        recipients: Vec<String>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            priority: 0,
            from: from.into(),
            recipients,
            subject_prefix: "[faultbus]".to_string(),
            min_severity: Severity::High,
            transport,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn render(&self, alert: &Alert) -> EmailMessage {
        EmailMessage {
            from: self.from.clone(),
            to: self.recipients.clone(),
            subject: format!("{} {}", self.subject_prefix, alert.title()),
            body: alert.body(),
        }
    }
}

impl Component for EmailNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[async_trait]
impl ErrorNotifier for EmailNotifier {
    fn min_severity(&self) -> Severity {
        self.min_severity
    }

    async fn notify(&self, record: &ErrorRecord) -> ComponentResult<NotificationReceipt> {
        if self.recipients.is_empty() {
            return Err(ComponentError::Rejected("no recipients configured".to_string()));
        }
        let message = self.render(&Alert::from_record(record));
        let id = self.transport.send(&message).await?;
        Ok(NotificationReceipt::new("email").with_reference(id))
    }
}
