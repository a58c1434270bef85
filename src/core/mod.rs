//! Core functionality module
//!
//! This module contains the core logic of the scanner tool: configuration,
//! error handling, capability negotiation, the transfer protocol and the
//! session orchestration that ties them together.
//!
//! # Submodules
//!
//! - `cancel` - Trigger-file cancellation monitor
//! - `config` - Configuration loading, saving, and management
//! - `context` - Shared per-run state (cancellation flag, open scanner)
//! - `error` - Error types and result aliases
//! - `negotiator` - Scan settings to capability writes
//! - `output` - Output sink writing pages to the output directory
//! - `session` - Session orchestration and exit codes
//! - `transfer` - Transfer protocol state machine and event loop

pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod negotiator;
pub mod output;
pub mod session;
pub mod transfer;
