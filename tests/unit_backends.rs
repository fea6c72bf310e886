use std::sync::Arc;
use std::time::Duration;

use perfgate::backend::{
    BackendSelector, MeasurementBackend, PortableBackend, MAX_OPERATION_NAME_LEN,
};
use perfgate::{BackendKind, BackendMode, SelectorConfig, UsageError};

fn backends() -> Vec<Arc<dyn MeasurementBackend>> {
    let mut all: Vec<Arc<dyn MeasurementBackend>> = vec![Arc::new(PortableBackend::new())];
    #[cfg(target_os = "linux")]
    all.push(Arc::new(perfgate::backend::NativeBackend::load().unwrap()));
    all
}

#[test]
fn test_backends_fill_the_same_sample_contract() {
    for backend in backends() {
        let handle = backend.begin("db", "load_users").unwrap();
        handle.activity().record_query("SELECT * FROM users");
        handle.activity().record_anonymous_query();
        handle.activity().record_cache_hit();
        std::thread::sleep(Duration::from_millis(2));
        let sample = backend.finalize(handle);

        assert_eq!(sample.operation_type, "db");
        assert_eq!(sample.operation_name, "load_users");
        assert!(sample.end_time_ns >= sample.start_time_ns + 2_000_000, "{}", backend.kind());
        assert_eq!(sample.query_count_end - sample.query_count_start, 2);
        assert_eq!((sample.cache_hits, sample.cache_misses), (1, 0));
        assert!(sample.baseline_memory_mb >= 0.0);
    }
}

#[test]
fn test_begin_validates_and_normalizes_names() {
    for backend in backends() {
        assert!(matches!(
            backend.begin("view", ""),
            Err(UsageError::EmptyOperationName { site: None, .. })
        ));

        let handle = backend.begin("", &"x".repeat(1_000)).unwrap();
        assert_eq!(handle.operation_type(), "general");
        assert_eq!(handle.operation_name().len(), MAX_OPERATION_NAME_LEN);
    }
}

#[test]
fn test_handles_are_independent() {
    let backend = PortableBackend::new();
    let a = backend.begin("view", "a").unwrap();
    let b = backend.begin("view", "b").unwrap();
    assert_ne!(a.id(), b.id());

    a.activity().record_query("SELECT 1");
    let (a, b) = (backend.finalize(a), backend.finalize(b));
    assert_eq!(a.query_count_end, 1);
    assert_eq!(b.query_count_end, 0);
}

#[test]
fn test_selector_monitors_use_chosen_backend() {
    let selector = BackendSelector::select(&SelectorConfig::new(BackendMode::ForceFallback));
    let mut monitor = selector.monitor("view", "Index");
    assert_eq!(monitor.backend_kind(), BackendKind::Fallback);
    monitor.start().unwrap();
    let metrics = monitor.stop().unwrap();
    assert!(metrics.response_time_ms >= 0.0);
}

#[cfg(target_os = "linux")]
#[test]
fn test_auto_selects_native_on_linux() {
    let selector = BackendSelector::select(&SelectorConfig::default());
    assert_eq!(selector.info().backend_kind, BackendKind::Native);
    assert_eq!(selector.backend().kind(), BackendKind::Native);
}
