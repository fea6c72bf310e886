use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Violation;
use crate::metrics::Metrics;

/// Which declared limit a threshold or violation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    ResponseTime,
    MemoryDelta,
    QueryCount,
}

impl ThresholdKind {
    pub fn unit(&self) -> &'static str {
        match self {
            Self::ResponseTime => "ms",
            Self::MemoryDelta => "MB",
            Self::QueryCount => "",
        }
    }
}

impl fmt::Display for ThresholdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResponseTime => "response time",
            Self::MemoryDelta => "memory delta",
            Self::QueryCount => "query count",
        })
    }
}

/// Declared performance budget. Unset limits are never checked or reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub max_response_time_ms: Option<f64>,
    pub max_memory_delta_mb: Option<f64>,
    pub max_query_count: Option<u64>,
}

impl Thresholds {
    pub fn is_empty(&self) -> bool {
        self.max_response_time_ms.is_none()
            && self.max_memory_delta_mb.is_none()
            && self.max_query_count.is_none()
    }

    /// Every exceeded limit, in declaration-independent fixed order.
    pub fn evaluate(&self, metrics: &Metrics) -> Vec<Violation> {
        let mut violations = Vec::new();

        if let Some(limit) = self.max_response_time_ms {
            if metrics.response_time_ms > limit {
                violations.push(Violation {
                    kind: ThresholdKind::ResponseTime,
                    actual: metrics.response_time_ms,
                    limit,
                });
            }
        }
        if let Some(limit) = self.max_memory_delta_mb {
            if metrics.memory_delta_mb > limit {
                violations.push(Violation {
                    kind: ThresholdKind::MemoryDelta,
                    actual: metrics.memory_delta_mb,
                    limit,
                });
            }
        }
        if let Some(limit) = self.max_query_count {
            if metrics.query_count > limit {
                violations.push(Violation {
                    kind: ThresholdKind::QueryCount,
                    actual: metrics.query_count as f64,
                    limit: limit as f64,
                });
            }
        }

        violations
    }
}
