use hdrhistogram::Histogram;
use serde::Serialize;

/// Response-time breakdown across recorded operations, in milliseconds.
///
/// `count`, `min_ms`, `max_ms` and `mean_ms` are exact; the percentiles come
/// from a microsecond HdrHistogram and carry its 3-significant-figure error.
#[derive(Debug, Clone, Serialize)]
pub struct PercentileSet {
    pub count: u64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl PercentileSet {
    /// `None` for an empty series rather than a zeroed placeholder.
    pub fn from_series(values_ms: &[f64], hist_us: &Histogram<u64>) -> Option<Self> {
        if values_ms.is_empty() || hist_us.len() == 0 {
            return None;
        }

        let count = values_ms.len() as u64;
        let (min_ms, max_ms) = values_ms
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let mean_ms = values_ms.iter().sum::<f64>() / count as f64;

        let at = |p: f64| hist_us.value_at_percentile(p) as f64 / 1_000.0;

        Some(Self {
            count,
            min_ms,
            max_ms,
            mean_ms,
            p50_ms: at(50.0),
            p95_ms: at(95.0),
            p99_ms: at(99.0),
        })
    }
}
