//! faultbus - an in-process error bus.
//!
//! Errors are published from anywhere in an application, classified on the
//! spot and queued. A periodic drain tick runs each queued record through
//! priority-ordered handlers, notifiers and recovery strategies, all of
//! which are pluggable traits.

pub mod bus;
pub mod classify;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod notify;
pub mod recovery;
pub mod registry;
pub mod stats;

pub use bus::{DrainReport, ErrorBus};
pub use config::{BusConfig, BusConfigPatch};
pub use error::{
    BusError, ComponentError, ComponentResult, ErrorClassification, ErrorContextFragment,
    ErrorRecord, ErrorType, RaisedError, Severity,
};
pub use registry::Component;
pub use stats::Statistics;
