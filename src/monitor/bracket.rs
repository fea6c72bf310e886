use tracing::debug;

use super::Monitor;
use crate::backend::Activity;
use crate::error::MonitorError;

/// Open measurement window over a borrowed monitor.
///
/// Dropping an armed bracket (panic, `?` in the caller, a cancelled future)
/// stops the monitor so the partial work still produces metrics. On that
/// path a threshold violation is logged and discarded.
pub(crate) struct Bracket<'m> {
    monitor: &'m mut Monitor,
    armed: bool,
}

impl<'m> Bracket<'m> {
    pub(crate) fn enter(monitor: &'m mut Monitor) -> Result<Self, MonitorError> {
        monitor.start()?;
        Ok(Self {
            monitor,
            armed: true,
        })
    }

    pub(crate) fn activity(&self) -> Activity {
        // Only reachable between a successful start and exit/abandon.
        self.monitor.activity().unwrap_or_default()
    }

    /// Normal exit: violations propagate.
    pub(crate) fn exit(mut self) -> Result<(), MonitorError> {
        self.armed = false;
        self.monitor.stop().map(|_| ())
    }

    /// Exit after the work failed; the work's error is what the caller sees.
    pub(crate) fn abandon(mut self) {
        self.armed = false;
        self.stop_quietly();
    }

    fn stop_quietly(&mut self) {
        let stopped = self.monitor.stop().map(|_| ());
        if let Err(err) = stopped {
            debug!(
                operation = %self.monitor.operation_name(),
                error = %err,
                "suppressed monitor error on faulted bracket"
            );
        }
    }
}

impl Drop for Bracket<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            self.stop_quietly();
        }
    }
}
