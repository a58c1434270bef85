//! Device interaction module
//!
//! This module provides the abstraction over the scanner driver layer.
//!
//! # Submodules
//!
//! - `traits` - Driver seam (`DeviceSubsystem`, `EventSource`) and the
//!   capability / event types that flow through it
//!
//! # Architecture
//!
//! The session code never calls a driver directly. It holds an
//! `Arc<dyn DeviceSubsystem>` and consumes an `EventSource`, so the
//! simulated scanners in `testdb` and a native binding are interchangeable.

pub mod traits;

// Re-export commonly used types from traits for convenience
pub use traits::{
    CapValue, Capability, CapabilityInfo, DeviceDescriptor, DeviceHandle, DeviceSubsystem,
    DisableReason, EnableMode, EventChannel, EventSource, FilmType, Frame, HostReply, LightPath,
    PixelType, ReturnCode, TransferEvent, TransferMechanism, TransferPayload, Unit,
};
