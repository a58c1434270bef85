//! Scanner CLI Tool Library
//!
//! Drives a scanner through one acquisition session: opens the device
//! subsystem, selects a scanner, negotiates capabilities, runs the transfer
//! protocol and saves the pages, while a trigger file (or Ctrl+C) can cancel
//! the run at any point.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - [`core`] - Configuration, errors, capability negotiation, the transfer
//!   state machine, cancellation monitor and session orchestration
//! - [`device`] - The device subsystem interface scanners are driven through
//! - [`cli`] - Command-line interface (only used by the binary)
//! - [`testdb`] - Simulated scanners and scenarios for running without hardware
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use scanner_cli_tool::core::config::Config;
//! use scanner_cli_tool::core::context::SessionContext;
//! use scanner_cli_tool::core::session::run_scan;
//! use scanner_cli_tool::testdb::ScenarioLibrary;
//! use std::sync::Arc;
//!
//! let config = Config::load_default().unwrap_or_default();
//! let subsystem = Arc::new(ScenarioLibrary::feeder_batch().build());
//! let ctx = Arc::new(SessionContext::new());
//!
//! let outcome = run_scan(subsystem, &config.scan_configuration(), ctx);
//! println!("{}", outcome);
//! std::process::exit(outcome.exit_code() as i32);
//! ```
//!
//! # Cancellation
//!
//! While a scan runs, creating a file named `cancel` (configurable) in the
//! watch directory cancels it: the transfer in flight is refused, the scanner
//! is closed and the run ends with exit code 2.

pub mod cli;
pub mod core;
pub mod device;
pub mod testdb;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
