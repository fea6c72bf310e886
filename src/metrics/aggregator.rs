use std::collections::BTreeMap;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::percentiles::PercentileSet;
use super::repeated::{detect_repeated_queries, RepeatedQueryReport};
use super::scoring::Grade;
use super::Metrics;

// ─── Configuration ───────────────────────────────────────────────

/// HdrHistogram range: 1 μs → 1 h, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 3_600_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe accumulator of metrics across many operations.
/// Writers call `record()`, readers take `statistics()` snapshots.
pub struct MetricsAggregator {
    inner: Mutex<Inner>,
}

/// One recorded operation with the queries it issued, if any were captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateEntry {
    pub metrics: Metrics,
    pub queries: Vec<String>,
}

/// Summary over everything recorded so far.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateStatistics {
    pub response_time: PercentileSet,

    pub mean_memory_delta_mb: f64,
    pub max_memory_delta_mb: f64,

    pub total_queries: u64,
    pub mean_query_count: f64,

    pub mean_score: f64,
    pub grade_distribution: BTreeMap<Grade, u64>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    entries: Vec<AggregateEntry>,
    response_hist: Histogram<u64>,
}

// ─── MetricsAggregator impl ──────────────────────────────────────

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn record(&self, metrics: Metrics) {
        self.inner.lock().record(metrics, Vec::new());
    }

    pub fn record_with_queries(&self, metrics: Metrics, queries: Vec<String>) {
        self.inner.lock().record(metrics, queries);
    }

    /// Wipe all data, e.g. between test runs.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        debug!(dropped = inner.entries.len(), "metrics aggregator reset");
        *inner = Inner::new();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<AggregateEntry> {
        self.inner.lock().entries.clone()
    }

    /// `None` until something has been recorded.
    pub fn statistics(&self) -> Option<AggregateStatistics> {
        self.inner.lock().statistics()
    }

    /// Lowest scores first; equal scores ordered slowest first.
    pub fn worst_performers(&self, limit: usize) -> Vec<Metrics> {
        let inner = self.inner.lock();
        let mut all: Vec<&Metrics> = inner.entries.iter().map(|e| &e.metrics).collect();
        all.sort_by(|a, b| {
            a.performance_score
                .cmp(&b.performance_score)
                .then(b.response_time_ms.total_cmp(&a.response_time_ms))
        });
        all.into_iter().take(limit).cloned().collect()
    }

    /// Group one operation's queries by shape and flag repeats.
    pub fn detect_repeated_queries<S: AsRef<str>>(&self, queries: &[S]) -> RepeatedQueryReport {
        detect_repeated_queries(queries)
    }

    /// Repeated-query detection over every recorded operation that carried
    /// queries. Only flagged operations are returned, in recording order.
    pub fn repeated_query_report(&self) -> Vec<(String, RepeatedQueryReport)> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .filter(|e| !e.queries.is_empty())
            .map(|e| {
                (
                    e.metrics.operation_name.clone(),
                    detect_repeated_queries(&e.queries),
                )
            })
            .filter(|(_, report)| report.is_flagged())
            .collect()
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            entries: Vec::with_capacity(64),
            response_hist: Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                .expect("histogram creation"),
        }
    }

    fn record(&mut self, metrics: Metrics, queries: Vec<String>) {
        // Clamp to ≥ 1 μs; anything past the upper bound saturates.
        let us = (metrics.response_time_ms * 1_000.0).round().max(1.0) as u64;
        self.response_hist.saturating_record(us);

        self.entries.push(AggregateEntry { metrics, queries });
    }

    fn statistics(&self) -> Option<AggregateStatistics> {
        let response_ms: Vec<f64> = self
            .entries
            .iter()
            .map(|e| e.metrics.response_time_ms)
            .collect();
        let response_time = PercentileSet::from_series(&response_ms, &self.response_hist)?;

        let n = self.entries.len() as f64;
        let mut memory_sum = 0.0;
        let mut max_memory_delta_mb = f64::NEG_INFINITY;
        let mut total_queries = 0u64;
        let mut score_sum = 0.0;
        let mut grade_distribution = BTreeMap::new();

        for entry in &self.entries {
            let m = &entry.metrics;
            memory_sum += m.memory_delta_mb;
            max_memory_delta_mb = max_memory_delta_mb.max(m.memory_delta_mb);
            total_queries += m.query_count;
            score_sum += f64::from(m.performance_score);
            *grade_distribution.entry(m.grade).or_insert(0) += 1;
        }

        Some(AggregateStatistics {
            response_time,
            mean_memory_delta_mb: memory_sum / n,
            max_memory_delta_mb,
            total_queries,
            mean_query_count: total_queries as f64 / n,
            mean_score: score_sum / n,
            grade_distribution,
        })
    }
}
