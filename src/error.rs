use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitor::ThresholdKind;

// ─── Call-site provenance ────────────────────────────────────────

/// Where an instrumented test lives. Only used to make error messages
/// point at the offending call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub file: String,
    pub line: u32,
    pub function: String,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} in {}", self.file, self.line, self.function)
    }
}

fn at(site: &Option<CallSite>) -> String {
    match site {
        Some(site) => format!(" (at {site})"),
        None => String::new(),
    }
}

// ─── Usage errors ────────────────────────────────────────────────

/// A mistake at the instrumentation call site. Never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UsageError {
    #[error("monitor for '{operation}' is already started{}", at(.site))]
    AlreadyStarted {
        operation: String,
        site: Option<CallSite>,
    },

    #[error("monitor for '{operation}' was never started{}", at(.site))]
    NotStarted {
        operation: String,
        site: Option<CallSite>,
    },

    #[error("no completed measurement for '{operation}'{}", at(.site))]
    NoMeasurement {
        operation: String,
        site: Option<CallSite>,
    },

    #[error("{kind} threshold for '{operation}' must be positive, got {value}{}", at(.site))]
    InvalidThreshold {
        operation: String,
        kind: ThresholdKind,
        value: f64,
        site: Option<CallSite>,
    },

    #[error("operation name must not be empty (type '{operation_type}'){}", at(.site))]
    EmptyOperationName {
        operation_type: String,
        site: Option<CallSite>,
    },

    #[error("test '{test_name}' is not running")]
    TestNotRunning { test_name: String },
}

// ─── Threshold violations ────────────────────────────────────────

/// One declared limit that the observed metrics exceeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ThresholdKind,
    pub actual: f64,
    pub limit: f64,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = self.kind.unit();
        write!(
            f,
            "{} {:.2}{unit} exceeds limit of {:.2}{unit}",
            self.kind, self.actual, self.limit
        )
    }
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Every threshold that failed for one stopped measurement.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("performance thresholds exceeded for '{operation}'{}: {}", at(.site), join(.violations))]
pub struct ThresholdViolation {
    pub operation: String,
    pub site: Option<CallSite>,
    pub violations: Vec<Violation>,
}

impl ThresholdViolation {
    pub fn violated(&self, kind: ThresholdKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }
}

// ─── Composite errors ────────────────────────────────────────────

/// Anything `Monitor::stop` or `Monitor::check_thresholds` can fail with.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Threshold(#[from] ThresholdViolation),
}

impl MonitorError {
    pub fn as_violation(&self) -> Option<&ThresholdViolation> {
        match self {
            Self::Threshold(v) => Some(v),
            Self::Usage(_) => None,
        }
    }
}

/// Outcome of a scoped measurement whose work can itself fail.
/// A failure of the work always wins over a threshold violation.
#[derive(Debug, Error)]
pub enum MeasureError<E> {
    #[error("measured work failed: {0}")]
    Work(E),

    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

impl<E> MeasureError<E> {
    pub fn work(&self) -> Option<&E> {
        match self {
            Self::Work(e) => Some(e),
            Self::Monitor(_) => None,
        }
    }

    pub fn monitor(&self) -> Option<&MonitorError> {
        match self {
            Self::Monitor(e) => Some(e),
            Self::Work(_) => None,
        }
    }
}

impl<E> From<UsageError> for MeasureError<E> {
    fn from(err: UsageError) -> Self {
        Self::Monitor(MonitorError::Usage(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_error_names_call_site() {
        let err = UsageError::AlreadyStarted {
            operation: "UserListView".into(),
            site: Some(CallSite {
                file: "tests/views.rs".into(),
                line: 42,
                function: "test_list".into(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "monitor for 'UserListView' is already started (at tests/views.rs:42 in test_list)"
        );
    }

    #[test]
    fn violation_lists_every_threshold() {
        let err = ThresholdViolation {
            operation: "search".into(),
            site: None,
            violations: vec![
                Violation {
                    kind: ThresholdKind::ResponseTime,
                    actual: 150.0,
                    limit: 100.0,
                },
                Violation {
                    kind: ThresholdKind::MemoryDelta,
                    actual: 12.5,
                    limit: 10.0,
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("performance thresholds exceeded for 'search': "));
        assert!(msg.contains("response time 150.00ms exceeds limit of 100.00ms"));
        assert!(msg.contains("memory delta 12.50MB exceeds limit of 10.00MB"));
    }
}
