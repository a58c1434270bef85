//! Cancellation monitor
//!
//! Watches a directory for a trigger file (default name `cancel`) using the
//! platform's change notifications. When the trigger appears the monitor
//! raises the session's cancellation flag, closes the open scanner and wakes
//! the transfer loop. The notification callback runs on the watcher's own
//! thread, concurrently with the loop.

use crate::core::context::SessionContext;
use crate::core::error::{Result, ScanError};
use crate::device::traits::DeviceSubsystem;
use log::{debug, error, info, warn};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Running trigger-file watch. Stops on drop.
pub struct CancellationMonitor {
    watcher: Option<RecommendedWatcher>,
    trigger_path: PathBuf,
    remove_on_stop: bool,
}

impl CancellationMonitor {
    /// Start watching `watch_dir` for a file named `trigger_name`.
    ///
    /// A trigger that already exists raises the flag immediately so the
    /// first proposed transfer is refused.
    pub fn start(
        watch_dir: &Path,
        trigger_name: &str,
        remove_on_stop: bool,
        ctx: Arc<SessionContext>,
        subsystem: Arc<dyn DeviceSubsystem>,
    ) -> Result<Self> {
        fs::create_dir_all(watch_dir).map_err(|e| {
            ScanError::WatchError(format!(
                "Failed to create watch directory '{}': {}",
                watch_dir.display(),
                e
            ))
        })?;

        let trigger_path = watch_dir.join(trigger_name);
        let name = trigger_name.to_string();
        let watch_ctx = Arc::clone(&ctx);
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if is_trigger_event(&event, &name) {
                        fire(&watch_ctx, subsystem.as_ref());
                    }
                }
                Err(e) => error!("Watch error: {:?}", e),
            },
            Config::default(),
        )?;

        watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;

        // checked only once the watch is armed, so a trigger created during
        // start is caught by one path or the other
        if trigger_path.exists() {
            info!(
                "Cancel trigger {} already present, scan will be cancelled",
                trigger_path.display()
            );
            ctx.cancel();
        }
        info!(
            "Watching {} for cancel trigger '{}'",
            watch_dir.display(),
            trigger_name
        );

        Ok(Self {
            watcher: Some(watcher),
            trigger_path,
            remove_on_stop,
        })
    }

    /// Path whose creation cancels the scan
    pub fn trigger_path(&self) -> &Path {
        &self.trigger_path
    }

    /// Stop watching and remove the trigger file. Safe to call twice.
    pub fn stop(&mut self) {
        let Some(watcher) = self.watcher.take() else {
            return;
        };
        drop(watcher);
        debug!("Cancel trigger watch stopped");

        if self.remove_on_stop && self.trigger_path.exists() {
            match fs::remove_file(&self.trigger_path) {
                Ok(()) => debug!("Removed cancel trigger {}", self.trigger_path.display()),
                Err(e) => warn!(
                    "Failed to remove cancel trigger {}: {}",
                    self.trigger_path.display(),
                    e
                ),
            }
        }
    }
}

impl Drop for CancellationMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_trigger_event(event: &Event, trigger_name: &str) -> bool {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    );
    relevant
        && event
            .paths
            .iter()
            .any(|p| p.file_name().map(|n| n == trigger_name).unwrap_or(false))
}

fn fire(ctx: &SessionContext, subsystem: &dyn DeviceSubsystem) {
    if !ctx.cancel() {
        debug!("Cancel trigger seen again, already cancelled");
        return;
    }
    info!("Cancel trigger detected, stopping scan");
    ctx.close_device(subsystem, "cancel trigger");
    ctx.request_loop_exit();
}
