//! Scan session orchestration
//!
//! Drives one run from session open to teardown:
//!
//! 1. open the device session and enumerate scanners
//! 2. select a scanner (name selector, else the first one) and open it
//! 3. negotiate capabilities, or hand over to the scanner's own dialog
//! 4. enable acquisition and start the cancellation monitor
//! 5. pump transfer events until the scanner is disabled
//! 6. stop the monitor, close the scanner, close the session
//!
//! Teardown is tied to guards, so it also runs when a step fails or panics.

use crate::core::cancel::CancellationMonitor;
use crate::core::config::ScanConfiguration;
use crate::core::context::SessionContext;
use crate::core::error::{Result, ScanError};
use crate::core::negotiator;
use crate::core::output::DirectorySink;
use crate::core::transfer::{ChannelEventSource, TransferMachine, TransferOutcome, TransferStats};
use crate::device::traits::{DeviceDescriptor, DeviceSubsystem, EnableMode};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::any::Any;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Exit code of a completed scan
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code of setup failures, device errors and faults
pub const EXIT_FAILURE: u8 = 1;
/// Exit code of a cancelled scan
pub const EXIT_CANCELLED: u8 = 2;

/// What a finished run produced
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    /// Name of the scanner used
    pub device: String,
    /// Transfer counters
    pub stats: TransferStats,
    /// Files written or recorded, in arrival order
    pub files: Vec<PathBuf>,
}

impl ScanSummary {
    /// Pages that reached the output
    pub fn pages(&self) -> usize {
        self.stats.saved + self.stats.forwarded
    }
}

/// Result of one scan run
#[derive(Debug)]
pub enum ScanOutcome {
    /// The scanner delivered every page
    Completed(ScanSummary),
    /// The run was cancelled (trigger file, Ctrl+C or the scanner's dialog)
    Cancelled(ScanSummary),
    /// The scanner ended acquisition with an error
    DeviceError {
        code: Option<u16>,
        summary: ScanSummary,
    },
    /// The run never reached acquisition
    SetupFailure(ScanError),
    /// Unexpected failure inside the run
    Fault(String),
}

impl ScanOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> u8 {
        match self {
            ScanOutcome::Completed(_) => EXIT_SUCCESS,
            ScanOutcome::Cancelled(_) => EXIT_CANCELLED,
            ScanOutcome::DeviceError { .. }
            | ScanOutcome::SetupFailure(_)
            | ScanOutcome::Fault(_) => EXIT_FAILURE,
        }
    }

    /// Summary of the transfer loop, if it ran
    pub fn summary(&self) -> Option<&ScanSummary> {
        match self {
            ScanOutcome::Completed(summary)
            | ScanOutcome::Cancelled(summary)
            | ScanOutcome::DeviceError { summary, .. } => Some(summary),
            ScanOutcome::SetupFailure(_) | ScanOutcome::Fault(_) => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ScanOutcome::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanOutcome::Cancelled(_))
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanOutcome::Completed(summary) => {
                write!(f, "Scan completed: {} page(s)", summary.pages())
            }
            ScanOutcome::Cancelled(summary) => {
                write!(f, "Scan cancelled after {} page(s)", summary.pages())
            }
            ScanOutcome::DeviceError {
                code: Some(code),
                summary,
            } => write!(
                f,
                "Scanner error (condition code {}) after {} page(s)",
                code,
                summary.pages()
            ),
            ScanOutcome::DeviceError {
                code: None,
                summary,
            } => write!(
                f,
                "Scanner stopped responding after {} page(s)",
                summary.pages()
            ),
            ScanOutcome::SetupFailure(e) => write!(f, "Scan failed: {}", e),
            ScanOutcome::Fault(message) => write!(f, "Unexpected failure: {}", message),
        }
    }
}

/// Closes the device session when dropped
struct SessionGuard<'a> {
    subsystem: &'a dyn DeviceSubsystem,
}

impl<'a> SessionGuard<'a> {
    fn open(subsystem: &'a dyn DeviceSubsystem) -> Result<Self> {
        subsystem.open_session()?;
        debug!("Device session opened");
        Ok(Self { subsystem })
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        debug!("Closing device session");
        self.subsystem.close_session();
    }
}

/// Closes the session's scanner when dropped, unless the monitor already did
struct DeviceGuard<'a> {
    ctx: &'a SessionContext,
    subsystem: &'a dyn DeviceSubsystem,
}

impl Drop for DeviceGuard<'_> {
    fn drop(&mut self) {
        self.ctx.close_device(self.subsystem, "session teardown");
    }
}

/// List the scanners the subsystem reports
pub fn list_devices(subsystem: &dyn DeviceSubsystem) -> Result<Vec<DeviceDescriptor>> {
    let _session = SessionGuard::open(subsystem)?;
    let devices = subsystem.enumerate_devices()?;
    debug!("Enumerated {} scanner(s)", devices.len());
    Ok(devices)
}

/// Pick the scanner to use.
///
/// With a selector, the first scanner whose name contains it
/// (case-insensitive); without one, the first scanner.
pub fn select_device<'a>(
    devices: &'a [DeviceDescriptor],
    selector: Option<&str>,
) -> Result<&'a DeviceDescriptor> {
    if devices.is_empty() {
        return Err(ScanError::NoDevicesFound);
    }

    match selector.map(str::trim).filter(|s| !s.is_empty()) {
        Some(selector) => devices
            .iter()
            .find(|d| d.matches_selector(selector))
            .ok_or_else(|| ScanError::DeviceNotFound(selector.to_string())),
        None => Ok(&devices[0]),
    }
}

/// Run one scan and report how it ended.
///
/// Never panics: failures become [`ScanOutcome::SetupFailure`] or
/// [`ScanOutcome::Fault`], and the session and scanner are closed on
/// every path.
pub fn run_scan(
    subsystem: Arc<dyn DeviceSubsystem>,
    config: &ScanConfiguration,
    ctx: Arc<SessionContext>,
) -> ScanOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| run_session(&subsystem, config, &ctx)));

    let outcome = match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => ScanOutcome::SetupFailure(e),
        Err(payload) => ScanOutcome::Fault(panic_message(payload.as_ref())),
    };

    match &outcome {
        ScanOutcome::Completed(_) => info!("{}", outcome),
        ScanOutcome::Cancelled(_) => warn!("{}", outcome),
        _ => error!("{}", outcome),
    }
    outcome
}

fn run_session(
    subsystem: &Arc<dyn DeviceSubsystem>,
    config: &ScanConfiguration,
    ctx: &Arc<SessionContext>,
) -> Result<ScanOutcome> {
    fs::create_dir_all(&config.output_dir).map_err(|e| {
        ScanError::IoError(format!(
            "Failed to create output directory '{}': {}",
            config.output_dir.display(),
            e
        ))
    })?;
    info!("Output directory: {}", config.output_dir.display());

    let driver = subsystem.as_ref();
    let _session = SessionGuard::open(driver)?;

    let devices = driver.enumerate_devices()?;
    for device in &devices {
        debug!("Found scanner: {}", device);
    }
    let descriptor = select_device(&devices, config.device_selector.as_deref())?.clone();
    info!("Selected scanner: {}", descriptor);

    let handle = driver.open_device(&descriptor)?;
    ctx.attach_device(handle);
    let _device = DeviceGuard {
        ctx: ctx.as_ref(),
        subsystem: driver,
    };

    let mode = if config.show_ui {
        info!("Showing the scanner's dialog, skipping configuration");
        EnableMode::ShowUi
    } else {
        negotiator::configure(driver, handle, config);
        EnableMode::NoUi
    };

    let channel = driver.enable(handle, mode)?;
    info!("Scanner enabled, waiting for pages...");

    let mut monitor = CancellationMonitor::start(
        &config.watch_dir,
        &config.trigger_name,
        config.remove_trigger_on_stop,
        Arc::clone(ctx),
        Arc::clone(subsystem),
    )?;

    let mut sink = DirectorySink::from_config(config);
    let mut source = ChannelEventSource::new(channel, ctx.loop_exit_signal());
    let (result, stats) = {
        let mut machine = TransferMachine::new(ctx.as_ref(), &mut sink).with_progress(page_spinner());
        let result = machine.run(&mut source);
        (result, machine.stats())
    };
    drop(source);
    monitor.stop();

    info!("{}", stats);
    let summary = ScanSummary {
        device: descriptor.name.clone(),
        stats,
        files: sink.saved().to_vec(),
    };

    Ok(match result {
        Ok(TransferOutcome::Completed) => ScanOutcome::Completed(summary),
        Ok(TransferOutcome::Cancelled) => ScanOutcome::Cancelled(summary),
        Ok(TransferOutcome::DeviceError { code }) => ScanOutcome::DeviceError { code, summary },
        Err(e) => ScanOutcome::Fault(format!("Transfer loop failed: {}", e)),
    })
}

fn page_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Waiting for the scanner...");
    spinner
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
