//! Generic JSON webhook notifier with optional HMAC signing.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::json;
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;

use super::{Alert, ErrorNotifier, NotificationReceipt};
use crate::error::{ComponentError, ComponentResult, ErrorRecord, Severity};
use crate::registry::Component;

/// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex>` of the raw request body.
pub const SIGNATURE_HEADER: &str = "X-Faultbus-Signature";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Computes the hex-encoded HMAC-SHA256 of `payload` under `secret`.
pub fn sign_payload(secret: &str, payload: &[u8]) -> ComponentResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ComponentError::failed(format!("invalid signing key: {}", e)))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a signature header value (with or without the `sha256=` prefix).
///
/// Receivers can use this to authenticate deliveries.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let expected = match hex::decode(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);

    // Constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

/// Builds the shared HTTP client for outbound notifiers.
pub(crate) fn http_client(timeout: Duration) -> ComponentResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ComponentError::Unavailable(format!("failed to create HTTP client: {}", e)))
}

/// Sends a prepared request and maps the HTTP status to a component result.
pub(crate) async fn deliver(request: RequestBuilder) -> ComponentResult<StatusCode> {
    let response = request.send().await?;

    let status = response.status();
    if status.is_success() {
        return Ok(status);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ComponentError::Unavailable("receiver rate limit exceeded".to_string()));
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    if status.is_server_error() {
        Err(ComponentError::Unavailable(format!("HTTP {}: {}", status, error_text)))
    } else {
        Err(ComponentError::Rejected(format!("HTTP {}: {}", status, error_text)))
    }
}

/// POSTs the alert as JSON to a configured URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    name: String,
    priority: i32,
    url: String,
    secret: Option<String>,
    min_severity: Severity,
    headers: Vec<(String, String)>,
    client: Client,
}

impl WebhookNotifier {
    pub const DEFAULT_NAME: &'static str = "webhook";

    pub fn new(url: impl Into<String>) -> ComponentResult<Self> {
        Ok(Self {
            name: Self::DEFAULT_NAME.to_string(),
            priority: 0,
            url: url.into(),
            secret: None,
            min_severity: Severity::High,
            headers: Vec::new(),
            client: http_client(DEFAULT_TIMEOUT)?,
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

    /// Signs every delivery with HMAC-SHA256 under `secret`.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    /// Adds a static header, e.g. an API key expected by the receiver.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn body(&self, record: &ErrorRecord) -> ComponentResult<Vec<u8>> {
        let payload = json!({
            "event": "error.raised",
            "alert": Alert::from_record(record),
        });
        Ok(serde_json::to_vec(&payload)?)
    }
}

impl Component for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[async_trait]
impl ErrorNotifier for WebhookNotifier {
    fn min_severity(&self) -> Severity {
        self.min_severity
    }

    async fn notify(&self, record: &ErrorRecord) -> ComponentResult<NotificationReceipt> {
        let body = self.body(record)?;

        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            let signature = sign_payload(secret, &body)?;
            request = request.header(SIGNATURE_HEADER, format!("sha256={}", signature));
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let status = deliver(request.body(body)).await?;
        debug!(error_id = %record.id, url = %self.url, status = status.as_u16(), "Webhook delivered");

        Ok(NotificationReceipt::new("webhook").with_reference(status.as_u16().to_string()))
    }
}
