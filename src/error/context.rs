//! Correlation context attached to every published error.
//!
//! Adapters hand the bus an [`ErrorContextFragment`] with whatever they know
//! (tenant, user, transport details). The bus turns it into an immutable
//! [`ErrorContext`], generating the identifier and timestamp when missing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// The channel an error arrived through.
///
/// Only adapters at the edge construct these; the pipeline treats the value
/// as opaque metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transport {
    Http { method: String, path: String },
    #[serde(rename = "graphql")]
    GraphQl { operation: Option<String> },
    #[serde(rename = "websocket")]
    WebSocket { event: Option<String> },
    Cli { command: String },
    System { task: String },
}

impl Transport {
    pub fn http(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Http {
            method: method.into(),
            path: path.into(),
        }
    }

    pub fn system(task: impl Into<String>) -> Self {
        Self::System { task: task.into() }
    }

    /// Short label used in logs and alerts.
    pub fn label(&self) -> &'static str {
        match self {
            Transport::Http { .. } => "http",
            Transport::GraphQl { .. } => "graphql",
            Transport::WebSocket { .. } => "websocket",
            Transport::Cli { .. } => "cli",
            Transport::System { .. } => "system",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Http { method, path } => write!(f, "http {} {}", method, path),
            Transport::GraphQl { operation } => {
                write!(f, "graphql {}", operation.as_deref().unwrap_or("<anonymous>"))
            }
            Transport::WebSocket { event } => {
                write!(f, "websocket {}", event.as_deref().unwrap_or("<message>"))
            }
            Transport::Cli { command } => write!(f, "cli {}", command),
            Transport::System { task } => write!(f, "system {}", task),
        }
    }
}

/// Immutable correlation metadata for one published error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub department_id: Option<String>,
    pub request_id: Option<String>,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub source: Option<Transport>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub custom: BTreeMap<String, Value>,
}

impl ErrorContext {
    /// Builds a context from a fragment, filling in id and timestamp.
    pub fn from_fragment(fragment: ErrorContextFragment) -> Self {
        Self {
            id: fragment
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            timestamp: fragment.timestamp.unwrap_or_else(Utc::now),
            tenant_id: fragment.tenant_id,
            user_id: fragment.user_id,
            organization_id: fragment.organization_id,
            department_id: fragment.department_id,
            request_id: fragment.request_id,
            correlation_id: fragment.correlation_id,
            causation_id: fragment.causation_id,
            source: fragment.source,
            ip_address: fragment.ip_address,
            user_agent: fragment.user_agent,
            custom: fragment.custom,
        }
    }
}

/// Partial context supplied by callers. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorContextFragment {
    pub id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub department_id: Option<String>,
    pub request_id: Option<String>,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub source: Option<Transport>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub custom: BTreeMap<String, Value>,
}

impl ErrorContextFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn with_department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }

    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_causation(mut self, causation_id: impl Into<String>) -> Self {
        self.causation_id = Some(causation_id.into());
        self
    }

    pub fn with_source(mut self, source: Transport) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_client(
        mut self,
        ip_address: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        self.ip_address = Some(ip_address.into());
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}
