pub mod aggregator;
pub mod percentiles;
pub mod repeated;
pub mod scoring;

use serde::{Deserialize, Serialize};

use crate::backend::{bytes_to_mb, RawSample};
use crate::config::ScoringPolicy;

pub use aggregator::{AggregateStatistics, MetricsAggregator};
pub use percentiles::PercentileSet;
pub use repeated::{detect_repeated_queries, normalize_query, RepeatedQueryReport, Severity};
pub use scoring::Grade;

/// Growth above this is flagged by `is_memory_intensive`.
const MEMORY_INTENSIVE_MB: f64 = 50.0;

/// Below this hit ratio (with any cache activity) the cache is considered ineffective.
const POOR_CACHE_RATIO: f64 = 0.7;

/// Derived, immutable result of one bracketed operation.
/// Field names are the stable keys of the metrics payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub operation_type: String,
    pub operation_name: String,
    pub response_time_ms: f64,
    /// Negative when the operation released memory
    pub memory_delta_mb: f64,
    /// Resident memory at the end of the bracket
    pub memory_usage_mb: f64,
    pub baseline_memory_mb: f64,
    pub query_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// 1.0 when the operation never touched the cache
    pub cache_hit_ratio: f64,
    pub performance_score: u8,
    pub grade: Grade,
}

impl Metrics {
    pub fn from_sample(sample: &RawSample) -> Self {
        Self::from_sample_with_policy(sample, &ScoringPolicy::default())
    }

    pub fn from_sample_with_policy(sample: &RawSample, policy: &ScoringPolicy) -> Self {
        let elapsed_ns = sample.end_time_ns.saturating_sub(sample.start_time_ns);
        let response_time_ms = elapsed_ns as f64 / 1_000_000.0;

        let memory_delta_mb = (sample.memory_end_bytes as i128 - sample.memory_start_bytes as i128)
            as f64
            / 1_000_000.0;

        let performance_score = scoring::score(response_time_ms, memory_delta_mb, policy);

        Self {
            operation_type: sample.operation_type.clone(),
            operation_name: sample.operation_name.clone(),
            response_time_ms,
            memory_delta_mb,
            memory_usage_mb: bytes_to_mb(sample.memory_end_bytes),
            baseline_memory_mb: sample.baseline_memory_mb,
            query_count: sample.query_count_end.saturating_sub(sample.query_count_start),
            cache_hits: sample.cache_hits,
            cache_misses: sample.cache_misses,
            cache_hit_ratio: cache_hit_ratio(sample.cache_hits, sample.cache_misses),
            performance_score,
            grade: Grade::from_score(performance_score),
        }
    }

    pub fn is_memory_intensive(&self) -> bool {
        self.memory_delta_mb > MEMORY_INTENSIVE_MB
    }

    pub fn has_poor_cache_performance(&self) -> bool {
        self.cache_hits + self.cache_misses > 0 && self.cache_hit_ratio < POOR_CACHE_RATIO
    }

    /// Stable-keyed mapping for reporting layers.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// No cache activity counts as a perfect ratio.
pub fn cache_hit_ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 1.0;
    }
    hits as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(elapsed_ns: u64, mem_start: u64, mem_end: u64) -> RawSample {
        RawSample {
            operation_type: "view".into(),
            operation_name: "UserListView".into(),
            start_time_ns: 5_000,
            end_time_ns: 5_000 + elapsed_ns,
            memory_start_bytes: mem_start,
            memory_end_bytes: mem_end,
            baseline_memory_mb: 40.0,
            query_count_start: 2,
            query_count_end: 9,
            cache_hits: 3,
            cache_misses: 1,
        }
    }

    #[test]
    fn derives_every_field() {
        let m = Metrics::from_sample(&sample(150_000_000, 10_000_000, 12_500_000));
        assert_eq!(m.response_time_ms, 150.0);
        assert_eq!(m.memory_delta_mb, 2.5);
        assert_eq!(m.memory_usage_mb, 12.5);
        assert_eq!(m.query_count, 7);
        assert_eq!(m.cache_hit_ratio, 0.75);
        assert_eq!(m.performance_score, 75);
        assert_eq!(m.grade, Grade::B);
    }

    #[test]
    fn released_memory_is_negative_delta() {
        let m = Metrics::from_sample(&sample(1_000_000, 30_000_000, 20_000_000));
        assert_eq!(m.memory_delta_mb, -10.0);
        assert_eq!(m.performance_score, 100);
    }

    #[test]
    fn no_cache_activity_is_perfect_ratio() {
        assert_eq!(cache_hit_ratio(0, 0), 1.0);
        assert_eq!(cache_hit_ratio(0, 4), 0.0);
    }

    #[test]
    fn diagnostics_predicates() {
        let mut m = Metrics::from_sample(&sample(1_000_000, 0, 60_000_000));
        assert!(m.is_memory_intensive());
        assert!(!m.has_poor_cache_performance());

        m.cache_hits = 3;
        m.cache_misses = 17;
        m.cache_hit_ratio = cache_hit_ratio(3, 17);
        assert!(m.has_poor_cache_performance());
    }

    #[test]
    fn payload_uses_stable_keys() {
        let payload = Metrics::from_sample(&sample(1_000_000, 0, 0)).to_payload();
        for key in [
            "response_time_ms",
            "memory_delta_mb",
            "query_count",
            "cache_hit_ratio",
            "performance_score",
        ] {
            assert!(payload.get(key).is_some(), "missing {key}");
        }
        assert_eq!(payload["grade"], "S");
    }
}
