#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;

use perfgate::backend::{BackendKind, MeasurementBackend};
use perfgate::RawSample;

/// Route library logs to the test harness; filter with `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Backend whose clock and memory only move when a test says so.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    now_ns: AtomicU64,
    resident_bytes: AtomicU64,
}

impl ScriptedBackend {
    pub fn advance_ms(&self, ms: u64) {
        self.now_ns.fetch_add(ms * 1_000_000, Ordering::SeqCst);
    }

    pub fn grow_mb(&self, mb: u64) {
        self.resident_bytes.fetch_add(mb * 1_000_000, Ordering::SeqCst);
    }
}

impl MeasurementBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fallback
    }

    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    fn resident_bytes(&self) -> u64 {
        self.resident_bytes.load(Ordering::SeqCst)
    }

    fn baseline_memory_mb(&self) -> f64 {
        0.0
    }
}

pub fn sample(name: &str, elapsed_ms: u64, memory_delta_mb: i64, queries: u64) -> RawSample {
    let memory_start_bytes = 200_000_000u64;
    RawSample {
        operation_type: "view".to_string(),
        operation_name: name.to_string(),
        start_time_ns: 1_000,
        end_time_ns: 1_000 + elapsed_ms * 1_000_000,
        memory_start_bytes,
        memory_end_bytes: (memory_start_bytes as i64 + memory_delta_mb * 1_000_000) as u64,
        baseline_memory_mb: 200.0,
        query_count_start: 0,
        query_count_end: queries,
        cache_hits: 0,
        cache_misses: 0,
    }
}
