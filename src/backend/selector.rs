use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{BackendKind, MeasurementBackend, NativeBackend, PortableBackend};
use crate::config::{BackendMode, SelectorConfig};
use crate::monitor::Monitor;

/// Which backend is active and why. Queryable any time after first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationInfo {
    pub backend_kind: BackendKind,
    pub reason: String,
    pub requested_mode: BackendMode,
    /// `None` when the native backend was never tried
    pub native_available: Option<bool>,
}

/// Chooses between the native and the portable backend and hands out
/// monitors bound to the chosen one.
#[derive(Debug)]
pub struct BackendSelector {
    backend: Arc<dyn MeasurementBackend>,
    info: ImplementationInfo,
}

impl BackendSelector {
    pub fn select(config: &SelectorConfig) -> Self {
        Self::select_with(config, || {
            NativeBackend::load().map(|b| Arc::new(b) as Arc<dyn MeasurementBackend>)
        })
    }

    /// Selection with an injectable native loader. A failing loader is
    /// never an error: the portable backend takes over and the reason is
    /// kept for diagnostics.
    pub fn select_with<F>(config: &SelectorConfig, load_native: F) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn MeasurementBackend>, String>,
    {
        let requested_mode = config.mode;

        if requested_mode == BackendMode::ForceFallback {
            return Self::fallback(
                requested_mode,
                "fallback forced by configuration".into(),
                None,
            );
        }

        match load_native() {
            Ok(backend) => {
                let reason = match requested_mode {
                    BackendMode::ForceNative => "native backend forced by configuration",
                    _ => "native backend available",
                };
                Self {
                    backend,
                    info: ImplementationInfo {
                        backend_kind: BackendKind::Native,
                        reason: reason.into(),
                        requested_mode,
                        native_available: Some(true),
                    },
                }
            }
            Err(cause) => {
                warn!(%cause, "native measurement backend unavailable");
                let reason = match requested_mode {
                    BackendMode::ForceNative => {
                        format!("native backend forced but unavailable: {cause}")
                    }
                    _ => format!("native backend unavailable: {cause}"),
                };
                Self::fallback(requested_mode, reason, Some(false))
            }
        }
    }

    fn fallback(
        requested_mode: BackendMode,
        reason: String,
        native_available: Option<bool>,
    ) -> Self {
        Self {
            backend: Arc::new(PortableBackend::new()),
            info: ImplementationInfo {
                backend_kind: BackendKind::Fallback,
                reason,
                requested_mode,
                native_available,
            },
        }
    }

    pub fn backend(&self) -> Arc<dyn MeasurementBackend> {
        Arc::clone(&self.backend)
    }

    pub fn info(&self) -> &ImplementationInfo {
        &self.info
    }

    pub fn monitor(&self, operation_type: &str, operation_name: &str) -> Monitor {
        Monitor::new(self.backend(), operation_type, operation_name)
    }
}

// ─── Process-wide selector ───────────────────────────────────────

static GLOBAL: RwLock<Option<Arc<BackendSelector>>> = parking_lot::const_rwlock(None);

/// The process-wide selector, initialized from the environment on first use.
/// Concurrent first calls initialize it exactly once.
pub fn global() -> Arc<BackendSelector> {
    if let Some(selector) = GLOBAL.read().as_ref() {
        return Arc::clone(selector);
    }

    let mut slot = GLOBAL.write();
    if let Some(selector) = slot.as_ref() {
        return Arc::clone(selector);
    }

    let selector = Arc::new(BackendSelector::select(&SelectorConfig::from_env()));
    info!(
        backend = %selector.info.backend_kind,
        reason = %selector.info.reason,
        "measurement backend selected"
    );
    *slot = Some(Arc::clone(&selector));
    selector
}

/// Forget the process-wide choice so the next use re-reads the environment.
/// Monitors created earlier keep the backend they were bound to.
pub fn reset_global() {
    *GLOBAL.write() = None;
}

pub fn implementation_info() -> ImplementationInfo {
    global().info().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable() -> Result<Arc<dyn MeasurementBackend>, String> {
        Err("no procfs".into())
    }

    fn portable_as_native() -> Result<Arc<dyn MeasurementBackend>, String> {
        Ok(Arc::new(PortableBackend::new()))
    }

    #[test]
    fn auto_falls_back_when_native_cannot_load() {
        let selector = BackendSelector::select_with(&SelectorConfig::default(), unavailable);
        let info = selector.info();
        assert_eq!(info.backend_kind, BackendKind::Fallback);
        assert_eq!(info.reason, "native backend unavailable: no procfs");
        assert_eq!(info.native_available, Some(false));
    }

    #[test]
    fn forced_native_still_falls_back() {
        let config = SelectorConfig::new(BackendMode::ForceNative);
        let selector = BackendSelector::select_with(&config, unavailable);
        assert_eq!(selector.info().backend_kind, BackendKind::Fallback);
        assert!(selector.info().reason.contains("forced but unavailable"));
    }

    #[test]
    fn forced_fallback_never_tries_native() {
        let config = SelectorConfig::new(BackendMode::ForceFallback);
        let selector = BackendSelector::select_with(&config, || {
            panic!("native loader must not run when fallback is forced")
        });
        assert_eq!(selector.info().backend_kind, BackendKind::Fallback);
        assert_eq!(selector.backend().kind(), BackendKind::Fallback);
        assert_eq!(selector.info().native_available, None);
    }

    #[test]
    fn available_native_is_preferred() {
        let selector = BackendSelector::select_with(&SelectorConfig::default(), portable_as_native);
        assert_eq!(selector.info().backend_kind, BackendKind::Native);
        assert_eq!(selector.info().native_available, Some(true));
        assert_eq!(selector.info().reason, "native backend available");
    }

    #[test]
    fn info_serializes_with_stable_keys() {
        let selector = BackendSelector::select_with(&SelectorConfig::default(), unavailable);
        let json = serde_json::to_value(selector.info()).unwrap();
        assert_eq!(json["backend_kind"], "fallback");
        assert_eq!(json["requested_mode"], "auto");
        assert!(json["reason"].as_str().unwrap().starts_with("native backend unavailable"));
    }
}
