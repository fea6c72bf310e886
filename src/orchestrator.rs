use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::UsageError;
use crate::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
}

/// Lifecycle of one named test case. Running while `ended_at` is `None`.
#[derive(Debug, Clone, Serialize)]
pub struct TestRecord {
    pub test_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: Option<TestStatus>,
    pub duration_ms: Option<f64>,
    /// Last metrics observed while the test was running
    pub metrics: Option<Metrics>,

    #[serde(skip)]
    clock: Instant,
}

impl TestRecord {
    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlowestTest {
    pub test_name: String,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub finished: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    /// Started but never ended, sorted by name
    pub incomplete: Vec<String>,

    pub total_duration_ms: f64,
    pub mean_duration_ms: Option<f64>,
    pub slowest: Option<SlowestTest>,

    /// Finished tests whose attached metrics graded D or F
    pub needs_attention: Vec<String>,
}

// ─── Orchestrator ────────────────────────────────────────────────

/// Tracks test-case lifecycles across a run. Safe to share between
/// concurrently running tests.
pub struct TestOrchestrator {
    inner: Mutex<Inner>,
}

struct Inner {
    run_id: Uuid,
    records: BTreeMap<String, TestRecord>,
}

impl Inner {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            records: BTreeMap::new(),
        }
    }

    fn running(&mut self, test_name: &str) -> Result<&mut TestRecord, UsageError> {
        match self.records.get_mut(test_name) {
            Some(record) if record.is_running() => Ok(record),
            _ => Err(UsageError::TestNotRunning {
                test_name: test_name.to_owned(),
            }),
        }
    }
}

impl TestOrchestrator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.inner.lock().run_id
    }

    /// Begin `test_name`. A record with the same name is replaced, so a
    /// retried test only keeps its latest attempt.
    pub fn start(&self, test_name: &str) {
        let record = TestRecord {
            test_name: test_name.to_owned(),
            started_at: Utc::now(),
            ended_at: None,
            status: None,
            duration_ms: None,
            metrics: None,
            clock: Instant::now(),
        };
        let mut inner = self.inner.lock();
        if inner.records.insert(test_name.to_owned(), record).is_some() {
            debug!(test = test_name, "test restarted, previous record replaced");
        }
    }

    pub fn end(&self, test_name: &str, status: TestStatus) -> Result<TestRecord, UsageError> {
        let mut inner = self.inner.lock();
        let record = inner.running(test_name).map_err(|err| {
            warn!(test = test_name, "end requested for a test that is not running");
            err
        })?;

        record.duration_ms = Some(record.clock.elapsed().as_secs_f64() * 1_000.0);
        record.ended_at = Some(Utc::now());
        record.status = Some(status);
        Ok(record.clone())
    }

    pub fn record_metrics(&self, test_name: &str, metrics: Metrics) -> Result<(), UsageError> {
        let mut inner = self.inner.lock();
        inner.running(test_name)?.metrics = Some(metrics);
        Ok(())
    }

    pub fn record(&self, test_name: &str) -> Option<TestRecord> {
        self.inner.lock().records.get(test_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a fresh run: records cleared, new run id.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        debug!(run_id = %inner.run_id, dropped = inner.records.len(), "orchestrator reset");
        *inner = Inner::new();
    }

    pub fn summary(&self) -> RunSummary {
        let inner = self.inner.lock();

        let mut summary = RunSummary {
            run_id: inner.run_id,
            total: inner.records.len(),
            finished: 0,
            passed: 0,
            failed: 0,
            errored: 0,
            incomplete: Vec::new(),
            total_duration_ms: 0.0,
            mean_duration_ms: None,
            slowest: None,
            needs_attention: Vec::new(),
        };

        for record in inner.records.values() {
            let (Some(status), Some(duration_ms)) = (record.status, record.duration_ms) else {
                summary.incomplete.push(record.test_name.clone());
                continue;
            };

            summary.finished += 1;
            match status {
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => summary.failed += 1,
                TestStatus::Error => summary.errored += 1,
            }

            summary.total_duration_ms += duration_ms;
            let slower = summary
                .slowest
                .as_ref()
                .map_or(true, |s| duration_ms > s.duration_ms);
            if slower {
                summary.slowest = Some(SlowestTest {
                    test_name: record.test_name.clone(),
                    duration_ms,
                });
            }

            if record
                .metrics
                .as_ref()
                .is_some_and(|m| m.grade.needs_attention())
            {
                summary.needs_attention.push(record.test_name.clone());
            }
        }

        if summary.finished > 0 {
            summary.mean_duration_ms = Some(summary.total_duration_ms / summary.finished as f64);
        }
        summary
    }
}

impl Default for TestOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}
