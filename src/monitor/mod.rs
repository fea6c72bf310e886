//! Scoped measurement of a single named operation.
//!
//! A `Monitor` is configured once (thresholds, test context) and can then
//! bracket the same operation any number of times. Each `stop()` replaces
//! the previous `Metrics`.

mod bracket;
pub mod thresholds;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{
    Activity, BackendKind, MeasurementBackend, SampleHandle, DEFAULT_OPERATION_TYPE,
};
use crate::config::ScoringPolicy;
use crate::error::{
    CallSite, MeasureError, MonitorError, ThresholdViolation, UsageError, Violation,
};
use crate::metrics::Metrics;

use bracket::Bracket;
pub use thresholds::{ThresholdKind, Thresholds};

/// Brackets one named operation and derives `Metrics` from each bracket.
#[derive(Debug)]
pub struct Monitor {
    backend: Arc<dyn MeasurementBackend>,
    operation_type: String,
    operation_name: String,

    handle: Option<SampleHandle>,
    metrics: Option<Metrics>,
    captured_queries: Vec<String>,

    thresholds: Thresholds,
    auto_assert: bool,
    call_site: Option<CallSite>,
    policy: ScoringPolicy,
}

impl Monitor {
    pub fn new(
        backend: Arc<dyn MeasurementBackend>,
        operation_type: &str,
        operation_name: &str,
    ) -> Self {
        let operation_type = if operation_type.trim().is_empty() {
            DEFAULT_OPERATION_TYPE
        } else {
            operation_type
        };
        Self {
            backend,
            operation_type: operation_type.to_owned(),
            operation_name: operation_name.to_owned(),
            handle: None,
            metrics: None,
            captured_queries: Vec::new(),
            thresholds: Thresholds::default(),
            auto_assert: true,
            call_site: None,
            policy: ScoringPolicy::default(),
        }
    }

    // ─── Accessors ───────────────────────────────────────────────

    pub fn operation_type(&self) -> &str {
        &self.operation_type
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Metrics of the most recent completed bracket.
    pub fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_ref()
    }

    /// Query texts reported during the most recent completed bracket.
    pub fn captured_queries(&self) -> &[String] {
        &self.captured_queries
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn auto_assert(&self) -> bool {
        self.auto_assert
    }

    pub fn test_context(&self) -> Option<&CallSite> {
        self.call_site.as_ref()
    }

    // ─── Fluent configuration ────────────────────────────────────

    pub fn expect_response_under(&mut self, ms: f64) -> Result<&mut Self, UsageError> {
        self.positive(ThresholdKind::ResponseTime, ms)?;
        self.thresholds.max_response_time_ms = Some(ms);
        Ok(self)
    }

    pub fn expect_memory_under(&mut self, mb: f64) -> Result<&mut Self, UsageError> {
        self.positive(ThresholdKind::MemoryDelta, mb)?;
        self.thresholds.max_memory_delta_mb = Some(mb);
        Ok(self)
    }

    pub fn expect_queries_under(&mut self, count: u64) -> Result<&mut Self, UsageError> {
        self.positive(ThresholdKind::QueryCount, count as f64)?;
        self.thresholds.max_query_count = Some(count);
        Ok(self)
    }

    pub fn disable_auto_assert(&mut self) -> &mut Self {
        self.auto_assert = false;
        self
    }

    pub fn enable_auto_assert(&mut self) -> &mut Self {
        self.auto_assert = true;
        self
    }

    pub fn set_test_context(
        &mut self,
        file: impl Into<String>,
        line: u32,
        function: impl Into<String>,
    ) -> &mut Self {
        self.call_site = Some(CallSite {
            file: file.into(),
            line,
            function: function.into(),
        });
        self
    }

    pub fn with_scoring_policy(&mut self, policy: ScoringPolicy) -> &mut Self {
        self.policy = policy;
        self
    }

    fn positive(&self, kind: ThresholdKind, value: f64) -> Result<(), UsageError> {
        // NaN fails this too.
        if value > 0.0 {
            return Ok(());
        }
        Err(UsageError::InvalidThreshold {
            operation: self.operation_name.clone(),
            kind,
            value,
            site: self.call_site.clone(),
        })
    }

    // ─── Lifecycle ───────────────────────────────────────────────

    pub fn start(&mut self) -> Result<(), UsageError> {
        if self.handle.is_some() {
            return Err(UsageError::AlreadyStarted {
                operation: self.operation_name.clone(),
                site: self.call_site.clone(),
            });
        }

        let handle = self
            .backend
            .begin(&self.operation_type, &self.operation_name)
            .map_err(|err| match err {
                UsageError::EmptyOperationName { operation_type, .. } => {
                    UsageError::EmptyOperationName {
                        operation_type,
                        site: self.call_site.clone(),
                    }
                }
                other => other,
            })?;
        debug!(
            operation = %self.operation_name,
            operation_type = %self.operation_type,
            sample = %handle.id(),
            backend = %self.backend.kind(),
            "monitor started"
        );
        self.handle = Some(handle);
        Ok(())
    }

    /// Finalize the bracket and derive metrics. The metrics are stored
    /// even when an auto-asserted threshold then fails.
    pub fn stop(&mut self) -> Result<&Metrics, MonitorError> {
        let handle = self.handle.take().ok_or_else(|| self.not_started())?;

        let queries = handle.activity().queries();
        let sample = self.backend.finalize(handle);
        let metrics = Metrics::from_sample_with_policy(&sample, &self.policy);
        debug!(
            operation = %self.operation_name,
            response_time_ms = metrics.response_time_ms,
            memory_delta_mb = metrics.memory_delta_mb,
            query_count = metrics.query_count,
            score = metrics.performance_score,
            "monitor stopped"
        );
        self.captured_queries = queries;

        let violations = if self.auto_assert {
            self.thresholds.evaluate(&metrics)
        } else {
            Vec::new()
        };
        if !violations.is_empty() {
            self.metrics = Some(metrics);
            return Err(self.violation(violations).into());
        }

        Ok(self.metrics.insert(metrics))
    }

    /// Evaluate declared thresholds against the latest metrics regardless
    /// of the auto-assert flag.
    pub fn check_thresholds(&self) -> Result<(), MonitorError> {
        let metrics = self.metrics.as_ref().ok_or_else(|| UsageError::NoMeasurement {
            operation: self.operation_name.clone(),
            site: self.call_site.clone(),
        })?;

        let violations = self.thresholds.evaluate(metrics);
        if violations.is_empty() {
            return Ok(());
        }
        Err(self.violation(violations).into())
    }

    fn violation(&self, violations: Vec<Violation>) -> ThresholdViolation {
        let violation = ThresholdViolation {
            operation: self.operation_name.clone(),
            site: self.call_site.clone(),
            violations,
        };
        warn!(operation = %self.operation_name, "{violation}");
        violation
    }

    fn not_started(&self) -> UsageError {
        UsageError::NotStarted {
            operation: self.operation_name.clone(),
            site: self.call_site.clone(),
        }
    }

    // ─── Activity reporting ──────────────────────────────────────

    /// Shared counters of the open bracket, for handing to query/cache hooks.
    pub fn activity(&self) -> Result<Activity, UsageError> {
        self.handle
            .as_ref()
            .map(|h| h.activity().clone())
            .ok_or_else(|| self.not_started())
    }

    pub fn record_query(&self, sql: impl Into<String>) -> Result<(), UsageError> {
        self.activity()?.record_query(sql);
        Ok(())
    }

    pub fn record_cache_hit(&self) -> Result<(), UsageError> {
        self.activity()?.record_cache_hit();
        Ok(())
    }

    pub fn record_cache_miss(&self) -> Result<(), UsageError> {
        self.activity()?.record_cache_miss();
        Ok(())
    }

    // ─── Scoped brackets ─────────────────────────────────────────

    /// Run `work` inside a start/stop bracket.
    ///
    /// The monitor is stopped on every exit path. If `work` fails, its
    /// error is returned and any threshold violation is dropped.
    pub fn measure<T, E, F>(&mut self, work: F) -> Result<T, MeasureError<E>>
    where
        F: FnOnce(&Activity) -> Result<T, E>,
    {
        let bracket = Bracket::enter(self)?;
        let activity = bracket.activity();
        match work(&activity) {
            Ok(value) => {
                bracket.exit()?;
                Ok(value)
            }
            Err(err) => {
                bracket.abandon();
                Err(MeasureError::Work(err))
            }
        }
    }

    /// Async counterpart of `measure`. Dropping the returned future before
    /// completion still stops the monitor.
    pub async fn measure_async<T, E, F, Fut>(&mut self, work: F) -> Result<T, MeasureError<E>>
    where
        F: FnOnce(Activity) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let bracket = Bracket::enter(self)?;
        let outcome = work(bracket.activity()).await;
        match outcome {
            Ok(value) => {
                bracket.exit()?;
                Ok(value)
            }
            Err(err) => {
                bracket.abandon();
                Err(MeasureError::Work(err))
            }
        }
    }
}
