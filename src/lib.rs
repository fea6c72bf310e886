//! Scoped performance measurement for test suites.
//!
//! A [`Monitor`] brackets one operation and turns the raw counters of the
//! active measurement backend into [`Metrics`]: response time, memory
//! growth, query count, cache hit ratio and a 0–100 score. Declared
//! thresholds fail the bracket when exceeded.
//!
//! The backend (native on Linux, portable elsewhere) is chosen once per
//! process; see [`implementation_info`].

pub mod backend;
pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod orchestrator;
pub mod query_analyzer;

pub use backend::selector::{implementation_info, reset_global};
pub use backend::{Activity, BackendKind, BackendSelector, ImplementationInfo, RawSample};
pub use config::{BackendMode, ScoringPolicy, SelectorConfig};
pub use error::{MeasureError, MonitorError, ThresholdViolation, UsageError, Violation};
pub use metrics::{Grade, Metrics, MetricsAggregator};
pub use monitor::{Monitor, ThresholdKind, Thresholds};
pub use orchestrator::{RunSummary, TestOrchestrator, TestStatus};
pub use query_analyzer::{analyze_query, AntiPattern, QueryAnalyzer, QueryVerdict};

/// A monitor bound to the process-wide backend.
pub fn monitor(operation_type: &str, operation_name: &str) -> Monitor {
    backend::selector::global().monitor(operation_type, operation_name)
}
