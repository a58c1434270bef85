//! Shared state of one scan session
//!
//! The orchestrator, the cancellation monitor and the transfer loop run on
//! different schedules. The state they share lives here and nowhere else:
//! the set-once cancellation flag, the handle of the open scanner, and the
//! wake signal that ends a blocked event loop.

use crate::device::traits::{DeviceHandle, DeviceSubsystem};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Session context passed by `Arc` to every component of a run
#[derive(Debug)]
pub struct SessionContext {
    cancelled: AtomicBool,
    device: Mutex<Option<DeviceHandle>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl SessionContext {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            cancelled: AtomicBool::new(false),
            device: Mutex::new(None),
            wake_tx,
            wake_rx,
        }
    }

    /// Raise the cancellation flag. Returns `true` only for the call that
    /// actually raised it.
    pub fn cancel(&self) -> bool {
        let first = !self.cancelled.swap(true, Ordering::SeqCst);
        if first {
            info!("Cancellation requested");
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Ask a blocked event loop to stop waiting for the scanner
    pub fn request_loop_exit(&self) {
        // a pending wake is as good as a second one
        let _ = self.wake_tx.try_send(());
    }

    /// Receiver side of the wake signal, used by the event pump
    pub fn loop_exit_signal(&self) -> Receiver<()> {
        self.wake_rx.clone()
    }

    /// Record the scanner opened for this session
    pub fn attach_device(&self, handle: DeviceHandle) {
        *self.lock_device() = Some(handle);
    }

    /// Handle of the open scanner, if any
    pub fn active_device(&self) -> Option<DeviceHandle> {
        *self.lock_device()
    }

    /// Close the open scanner, at most once per session.
    ///
    /// Whoever gets here first (the monitor's emergency path or the
    /// orchestrator's teardown) takes the handle; later callers find nothing
    /// and return `false` without touching the driver.
    pub fn close_device(&self, subsystem: &dyn DeviceSubsystem, origin: &str) -> bool {
        let handle = self.lock_device().take();
        match handle {
            Some(handle) => {
                debug!("Closing scanner {} ({})", handle, origin);
                subsystem.close_device(handle);
                true
            }
            None => {
                debug!("Scanner already closed, skipping close from {}", origin);
                false
            }
        }
    }

    fn lock_device(&self) -> MutexGuard<'_, Option<DeviceHandle>> {
        self.device.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
