pub mod native;
pub mod portable;
pub mod selector;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::UsageError;

pub use native::NativeBackend;
pub use portable::PortableBackend;
pub use selector::{BackendSelector, ImplementationInfo};

/// Used when a caller hands in an empty operation type.
pub const DEFAULT_OPERATION_TYPE: &str = "general";

/// Longer operation names are cut down (on a char boundary) to this many bytes.
pub const MAX_OPERATION_NAME_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Native,
    Fallback,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Native => "native",
            Self::Fallback => "fallback",
        })
    }
}

// ─── Raw sample ──────────────────────────────────────────────────

/// Raw counters for one bracketed operation, as produced by a backend.
/// Both backends fill every field with identical semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub operation_type: String,
    pub operation_name: String,
    /// Monotonic clock, nanoseconds
    pub start_time_ns: u64,
    /// Never earlier than `start_time_ns`
    pub end_time_ns: u64,
    /// Resident set size at bracket entry
    pub memory_start_bytes: u64,
    pub memory_end_bytes: u64,
    /// Resident memory when the backend was created (informational)
    pub baseline_memory_mb: f64,
    pub query_count_start: u64,
    pub query_count_end: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

// ─── Activity counters ───────────────────────────────────────────

#[derive(Debug, Default)]
struct ActivityState {
    queries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    texts: Mutex<Vec<String>>,
}

/// Query and cache events reported while a bracket is open.
///
/// Cheap to clone; every clone feeds the same counters, so database or
/// cache hooks can hold one and report from wherever the work runs.
#[derive(Debug, Clone, Default)]
pub struct Activity {
    inner: Arc<ActivityState>,
}

impl Activity {
    pub fn record_query(&self, sql: impl Into<String>) {
        self.inner.queries.fetch_add(1, Ordering::Relaxed);
        self.inner.texts.lock().push(sql.into());
    }

    /// Count a query whose text was not captured.
    pub fn record_anonymous_query(&self) {
        self.inner.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn query_count(&self) -> u64 {
        self.inner.queries.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.inner.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.inner.cache_misses.load(Ordering::Relaxed)
    }

    /// Captured query texts in the order they were reported.
    pub fn queries(&self) -> Vec<String> {
        self.inner.texts.lock().clone()
    }
}

// ─── Sample handle ───────────────────────────────────────────────

/// An in-flight sample. Owned by whoever called `begin`.
#[derive(Debug)]
pub struct SampleHandle {
    id: Uuid,
    operation_type: String,
    operation_name: String,
    start_time_ns: u64,
    memory_start_bytes: u64,
    query_count_start: u64,
    activity: Activity,
}

impl SampleHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn operation_type(&self) -> &str {
        &self.operation_type
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }
}

// ─── Backend contract ────────────────────────────────────────────

/// A source of raw counters for bracketed operations.
///
/// Implementors only supply the clock and the memory reading; `begin` and
/// `finalize` are shared so both variants derive samples the same way.
/// Implementations must be safe to call from many monitors at once.
pub trait MeasurementBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Monotonic nanoseconds from an arbitrary fixed origin.
    fn now_ns(&self) -> u64;

    /// Current resident set size of the process, 0 if unknown.
    fn resident_bytes(&self) -> u64;

    fn baseline_memory_mb(&self) -> f64;

    fn begin(
        &self,
        operation_type: &str,
        operation_name: &str,
    ) -> Result<SampleHandle, UsageError> {
        let operation_type = if operation_type.trim().is_empty() {
            DEFAULT_OPERATION_TYPE
        } else {
            operation_type
        };
        if operation_name.trim().is_empty() {
            return Err(UsageError::EmptyOperationName {
                operation_type: operation_type.to_owned(),
                site: None,
            });
        }

        let activity = Activity::default();
        // Memory first so the clock does not include the read.
        let memory_start_bytes = self.resident_bytes();
        let start_time_ns = self.now_ns();

        Ok(SampleHandle {
            id: Uuid::new_v4(),
            operation_type: operation_type.to_owned(),
            operation_name: truncate_name(operation_name).to_owned(),
            start_time_ns,
            memory_start_bytes,
            query_count_start: activity.query_count(),
            activity,
        })
    }

    fn finalize(&self, handle: SampleHandle) -> RawSample {
        let end_time_ns = self.now_ns().max(handle.start_time_ns);
        let memory_end_bytes = self.resident_bytes();
        let activity = &handle.activity;

        RawSample {
            operation_type: handle.operation_type,
            operation_name: handle.operation_name,
            start_time_ns: handle.start_time_ns,
            end_time_ns,
            memory_start_bytes: handle.memory_start_bytes,
            memory_end_bytes,
            baseline_memory_mb: self.baseline_memory_mb(),
            query_count_start: handle.query_count_start,
            query_count_end: activity.query_count().max(handle.query_count_start),
            cache_hits: activity.cache_hits(),
            cache_misses: activity.cache_misses(),
        }
    }
}

fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_OPERATION_NAME_LEN {
        return name;
    }
    let mut end = MAX_OPERATION_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

pub(crate) fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / 1_000_000.0
}
