//! Backend that works wherever `std` and `sysinfo` do.

use std::time::Instant;

use parking_lot::Mutex;
use sysinfo::{Pid, System};

use super::{bytes_to_mb, BackendKind, MeasurementBackend};

#[derive(Debug)]
pub struct PortableBackend {
    anchor: Instant,
    pid: Option<Pid>,
    system: Mutex<System>,
    baseline_memory_mb: f64,
}

impl PortableBackend {
    pub fn new() -> Self {
        let mut backend = Self {
            anchor: Instant::now(),
            pid: sysinfo::get_current_pid().ok(),
            system: Mutex::new(System::new()),
            baseline_memory_mb: 0.0,
        };
        backend.baseline_memory_mb = bytes_to_mb(backend.resident_bytes());
        backend
    }
}

impl Default for PortableBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementBackend for PortableBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fallback
    }

    fn now_ns(&self) -> u64 {
        u64::try_from(self.anchor.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn resident_bytes(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return 0;
        }
        system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }

    fn baseline_memory_mb(&self) -> f64 {
        self.baseline_memory_mb
    }
}
