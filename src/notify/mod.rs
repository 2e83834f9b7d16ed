//! Notification stage.
//!
//! Notifiers deliver external alerts for drained records. Each one is gated
//! by its own severity threshold; the wire format of a channel is owned by
//! its notifier.

mod alert;
mod chat;
mod email;
mod webhook;

pub use alert::Alert;
pub use chat::ChatNotifier;
pub use email::{EmailMessage, EmailNotifier, LogMailTransport, MailTransport};
pub use webhook::{sign_payload, verify_signature, WebhookNotifier, SIGNATURE_HEADER};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ComponentResult, ErrorRecord, Severity};
use crate::registry::Component;

/// Proof of delivery returned by a notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationReceipt {
    /// Channel label, e.g. `webhook` or `email`.
    pub channel: String,
    pub delivered_at: DateTime<Utc>,
    /// Channel-specific reference (HTTP status, message id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl NotificationReceipt {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            delivered_at: Utc::now(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// An outbound alert channel.
#[async_trait]
pub trait ErrorNotifier: Component {
    /// Lowest severity this notifier fires for.
    fn min_severity(&self) -> Severity {
        Severity::High
    }

    fn should_notify(&self, record: &ErrorRecord) -> bool {
        record.classification.is_at_least(self.min_severity())
    }

    async fn notify(&self, record: &ErrorRecord) -> ComponentResult<NotificationReceipt>;
}
