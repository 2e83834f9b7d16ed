//! The original error as handed to the bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// An error captured at a call site.
///
/// The bus never holds on to the caller's `dyn Error` (it is usually neither
/// `Clone` nor `Send`), so the interesting parts are rendered into owned data
/// at publish time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaisedError {
    /// Error kind, e.g. a type name or an adapter supplied tag.
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Numeric status if the error carries one (HTTP, gRPC, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Rendered `source()` chain, outermost cause first.
    #[serde(default)]
    pub causes: Vec<String>,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
}

impl RaisedError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            code: None,
            status: None,
            causes: Vec::new(),
            details: BTreeMap::new(),
        }
    }

    /// Generic error with only a message, named `Error`.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    /// Captures any standard error, walking its source chain.
    pub fn from_std(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            name: short_type_name(error),
            message: error.to_string(),
            code: None,
            status: None,
            causes,
            details: BTreeMap::new(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Text searched by pattern classifiers: name, code, message and causes.
    pub fn searchable_text(&self) -> String {
        let mut text = format!("{} {}", self.name, self.message);
        if let Some(code) = &self.code {
            text.push(' ');
            text.push_str(code);
        }
        for cause in &self.causes {
            text.push(' ');
            text.push_str(cause);
        }
        text
    }
}

impl fmt::Display for RaisedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl From<&str> for RaisedError {
    fn from(message: &str) -> Self {
        Self::message(message)
    }
}

impl From<String> for RaisedError {
    fn from(message: String) -> Self {
        Self::message(message)
    }
}

impl From<std::io::Error> for RaisedError {
    fn from(error: std::io::Error) -> Self {
        let kind = format!("{:?}", error.kind());
        Self::from_std(&error).with_code(kind)
    }
}

impl From<serde_json::Error> for RaisedError {
    fn from(error: serde_json::Error) -> Self {
        Self::from_std(&error)
    }
}

// `std::any::type_name_of_val` is not usable through a trait object, so the
// Debug rendering is used as a best-effort kind label.
fn short_type_name(error: &(dyn std::error::Error + 'static)) -> String {
    let debug = format!("{:?}", error);
    let head: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if head.is_empty() {
        "Error".to_string()
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer {
        #[source]
        inner: Inner,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("inner failure")]
    struct Inner;

    #[test]
    fn test_from_std_walks_source_chain() {
        let error = Outer { inner: Inner };
        let raised = RaisedError::from_std(&error);
        assert_eq!(raised.name, "Outer");
        assert_eq!(raised.message, "outer failure");
        assert_eq!(raised.causes, vec!["inner failure".to_string()]);
    }

    #[test]
    fn test_from_io_error_sets_kind_code() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        let raised = RaisedError::from(io);
        assert_eq!(raised.code.as_deref(), Some("TimedOut"));
        assert_eq!(raised.message, "read timed out");
    }

    #[test]
    fn test_searchable_text_includes_everything() {
        let raised = RaisedError::new("DbError", "insert failed")
            .with_code("SQLSTATE_23505")
            .with_cause("duplicate key");
        let text = raised.searchable_text();
        assert!(text.contains("DbError"));
        assert!(text.contains("insert failed"));
        assert!(text.contains("SQLSTATE_23505"));
        assert!(text.contains("duplicate key"));
    }

    #[test]
    fn test_from_str_and_display() {
        let raised: RaisedError = "x".into();
        assert_eq!(raised.name, "Error");
        assert_eq!(raised.to_string(), "Error: x");
    }
}
