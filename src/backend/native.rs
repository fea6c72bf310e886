//! Linux backend reading the monotonic clock and `/proc/self/statm` directly.

use tracing::debug;

use super::{bytes_to_mb, BackendKind, MeasurementBackend};

#[derive(Debug)]
pub struct NativeBackend {
    page_size: u64,
    baseline_memory_mb: f64,
}

impl NativeBackend {
    /// Detect the native capabilities. The error is the human-readable
    /// reason the backend cannot be used on this host.
    pub fn load() -> Result<Self, String> {
        let page_size = sys::page_size()?;
        sys::monotonic_ns()?;
        let resident_pages = sys::resident_pages()?;

        let baseline_memory_mb = bytes_to_mb(resident_pages * page_size);
        debug!(page_size, baseline_memory_mb, "native backend loaded");

        Ok(Self {
            page_size,
            baseline_memory_mb,
        })
    }
}

impl MeasurementBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn now_ns(&self) -> u64 {
        sys::monotonic_ns().unwrap_or(0)
    }

    fn resident_bytes(&self) -> u64 {
        sys::resident_pages()
            .map(|pages| pages * self.page_size)
            .unwrap_or(0)
    }

    fn baseline_memory_mb(&self) -> f64 {
        self.baseline_memory_mb
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use std::fs;

    const STATM: &str = "/proc/self/statm";

    pub fn page_size() -> Result<u64, String> {
        // SAFETY: sysconf has no preconditions and only reads a constant.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size <= 0 {
            return Err("sysconf(_SC_PAGESIZE) failed".into());
        }
        Ok(size as u64)
    }

    pub fn monotonic_ns() -> Result<u64, String> {
        // SAFETY: timespec is plain old data; all-zero is a valid value.
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        // SAFETY: `ts` is a valid, writable timespec for the whole call.
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        if rc != 0 {
            return Err("clock_gettime(CLOCK_MONOTONIC) failed".into());
        }
        Ok(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64)
    }

    /// Second field of statm: resident pages.
    pub fn resident_pages() -> Result<u64, String> {
        let statm = fs::read_to_string(STATM).map_err(|e| format!("cannot read {STATM}: {e}"))?;
        statm
            .split_whitespace()
            .nth(1)
            .and_then(|field| field.parse().ok())
            .ok_or_else(|| format!("unexpected {STATM} format"))
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    const UNSUPPORTED: &str = "native backend requires Linux procfs";

    pub fn page_size() -> Result<u64, String> {
        Err(UNSUPPORTED.into())
    }

    pub fn monotonic_ns() -> Result<u64, String> {
        Err(UNSUPPORTED.into())
    }

    pub fn resident_pages() -> Result<u64, String> {
        Err(UNSUPPORTED.into())
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn loads_on_linux() {
        let backend = NativeBackend::load().unwrap();
        assert_eq!(backend.kind(), BackendKind::Native);
        assert!(backend.resident_bytes() > 0);
        assert!(backend.baseline_memory_mb() > 0.0);
    }

    #[test]
    fn clock_is_monotonic() {
        let backend = NativeBackend::load().unwrap();
        let a = backend.now_ns();
        let b = backend.now_ns();
        assert!(b >= a);
    }
}
