//! Device abstraction traits for testability
//!
//! This module defines the driver-facing seam of the tool. The device
//! subsystem (data source manager plus its scanners) is a black box exposed
//! through [`DeviceSubsystem`]; everything above it (negotiation, the
//! transfer protocol and the session orchestration) only talks to this trait,
//! so the same code runs against a native driver binding or the simulated
//! scanners in [`crate::testdb`].
//!
//! # Architecture
//!
//! - `DeviceSubsystem` - session, enumeration, open/close, capabilities, enable
//! - `EventSource` - blocking stream of [`TransferEvent`]s consumed by the
//!   transfer loop, with a reply path for ready events
//! - `DeviceDescriptor` / `DeviceHandle` - what enumeration returns and what
//!   opening a scanner yields
//! - `Capability` / `CapValue` / `CapabilityInfo` - the negotiable parameters
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use scanner_cli_tool::device::traits::{Capability, DeviceSubsystem};
//!
//! fn print_resolution<S: DeviceSubsystem>(subsystem: &S) -> Result<(), String> {
//!     subsystem.open_session().map_err(|e| e.to_string())?;
//!     let devices = subsystem.enumerate_devices().map_err(|e| e.to_string())?;
//!     if let Some(device) = devices.first() {
//!         let handle = subsystem.open_device(device).map_err(|e| e.to_string())?;
//!         let info = subsystem
//!             .get_capability(handle, Capability::XResolution)
//!             .map_err(|e| e.to_string())?;
//!         println!("{}: {:?}", device.name, info.current);
//!         subsystem.close_device(handle);
//!     }
//!     subsystem.close_session();
//!     Ok(())
//! }
//! ```

use crate::core::error::Result;
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::path::PathBuf;

/// Status codes reported by the driver layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnCode {
    Failure,
    Busy,
    BadCapability,
    CapabilityUnsupported,
    BadValue,
}

impl Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReturnCode::Failure => "Failure",
            ReturnCode::Busy => "Busy",
            ReturnCode::BadCapability => "BadCapability",
            ReturnCode::CapabilityUnsupported => "CapabilityUnsupported",
            ReturnCode::BadValue => "BadValue",
        };
        f.write_str(name)
    }
}

/// A scanner reported by enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Identifier assigned by the subsystem
    pub id: u32,
    /// Product name shown to the user (e.g., "EPSON WF-7710")
    pub name: String,
    /// Manufacturer string, may be empty
    #[serde(default)]
    pub manufacturer: String,
    /// Product family string, may be empty
    #[serde(default)]
    pub product_family: String,
}

impl DeviceDescriptor {
    /// Create a new DeviceDescriptor
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            manufacturer: String::new(),
            product_family: String::new(),
        }
    }

    /// Builder-style manufacturer setter
    pub fn with_manufacturer(mut self, manufacturer: &str) -> Self {
        self.manufacturer = manufacturer.to_string();
        self
    }

    /// Case-insensitive substring match of `selector` against the name
    pub fn matches_selector(&self, selector: &str) -> bool {
        self.name.to_lowercase().contains(&selector.to_lowercase())
    }
}

impl Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ID: {})", self.name, self.id)
    }
}

/// Opaque handle of an opened scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u32);

impl Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Negotiable scanner parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    FeederEnabled,
    LightPath,
    FilmType,
    PixelType,
    XResolution,
    YResolution,
    DuplexEnabled,
    Units,
    Frame,
    LampState,
}

impl Capability {
    /// Driver-level name of the capability
    pub fn name(&self) -> &'static str {
        match self {
            Capability::FeederEnabled => "CAP_FEEDERENABLED",
            Capability::LightPath => "ICAP_LIGHTPATH",
            Capability::FilmType => "ICAP_FILMTYPE",
            Capability::PixelType => "ICAP_PIXELTYPE",
            Capability::XResolution => "ICAP_XRESOLUTION",
            Capability::YResolution => "ICAP_YRESOLUTION",
            Capability::DuplexEnabled => "CAP_DUPLEXENABLED",
            Capability::Units => "ICAP_UNITS",
            Capability::Frame => "ICAP_FRAMES",
            Capability::LampState => "ICAP_LAMPSTATE",
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightPath {
    Reflective,
    Transmissive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilmType {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    BlackWhite,
    Gray,
    Rgb,
}

/// Measurement unit for frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Inches,
    Centimeters,
    Millimeters,
    Pixels,
}

/// Scan rectangle in the device's current unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// A capability value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CapValue {
    Bool(bool),
    UInt(u32),
    LightPath(LightPath),
    FilmType(FilmType),
    PixelType(PixelType),
    Unit(Unit),
    Frame(Frame),
}

/// What a scanner reports about one capability
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityInfo {
    /// The scanner knows this capability
    pub supported: bool,
    /// The scanner accepts writes to this capability
    pub settable: bool,
    /// Current value, if supported
    pub current: Option<CapValue>,
    /// Values the scanner offers (empty when it doesn't enumerate them)
    pub allowed: Vec<CapValue>,
}

impl CapabilityInfo {
    /// A capability the scanner doesn't know
    pub fn unsupported() -> Self {
        Self::default()
    }

    /// A supported, settable capability with a current value
    pub fn settable(current: CapValue) -> Self {
        Self {
            supported: true,
            settable: true,
            current: Some(current),
            allowed: Vec::new(),
        }
    }

    /// A supported capability that can only be read
    pub fn read_only(current: CapValue) -> Self {
        Self {
            supported: true,
            settable: false,
            current: Some(current),
            allowed: Vec::new(),
        }
    }

    /// Builder-style allowed-values setter
    pub fn with_allowed(mut self, allowed: Vec<CapValue>) -> Self {
        self.allowed = allowed;
        self
    }

    /// Supported and settable
    pub fn is_writable(&self) -> bool {
        self.supported && self.settable
    }

    /// Whether the scanner explicitly offers `value`
    pub fn offers(&self, value: &CapValue) -> bool {
        self.allowed.contains(value)
    }
}

/// How the scanner is enabled for acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableMode {
    /// Show the driver's own dialog
    ShowUi,
    /// Acquire with the negotiated settings, no dialog
    NoUi,
}

/// How a transferred page reaches the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMechanism {
    /// Raw image buffer in memory
    Native,
    /// Image already written to a file by the driver
    File,
}

impl Display for TransferMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMechanism::Native => f.write_str("Native"),
            TransferMechanism::File => f.write_str("File"),
        }
    }
}

/// Payload of a data event
#[derive(Debug, Clone, PartialEq)]
pub enum TransferPayload {
    Buffer(Vec<u8>),
    File(PathBuf),
}

impl TransferPayload {
    pub fn mechanism(&self) -> TransferMechanism {
        match self {
            TransferPayload::Buffer(_) => TransferMechanism::Native,
            TransferPayload::File(_) => TransferMechanism::File,
        }
    }
}

/// Why the scanner left the enabled state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableReason {
    /// All pages were delivered
    Completed,
    /// The user or the host cancelled
    Cancelled,
    /// The driver reported a condition code
    Error(u16),
    /// The event stream ended without a disable notification
    Disconnected,
}

/// Device callbacks, in the order the scanner emits them
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// The scanner proposes to transfer one page
    Ready {
        /// Pages the scanner still expects to deliver, when known
        pending: Option<u32>,
    },
    /// A page was delivered
    Data(TransferPayload),
    /// The scanner is no longer enabled
    Disabled(DisableReason),
}

/// Host answers sent back to the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostReply {
    /// The host's event loop is running and ready for callbacks
    Listening,
    /// Accept the proposed transfer
    Proceed,
    /// Refuse the proposed transfer and every pending one
    CancelAll,
}

/// Channel pair returned by [`DeviceSubsystem::enable`]
#[derive(Debug)]
pub struct EventChannel {
    pub events: Receiver<TransferEvent>,
    pub replies: Sender<HostReply>,
}

/// Blocking source of transfer events consumed by the transfer loop
pub trait EventSource {
    /// Block until the next event arrives
    fn next_event(&mut self) -> Result<TransferEvent>;

    /// Answer the most recent `Ready` event
    fn reply(&mut self, reply: HostReply) -> Result<()>;
}

/// Trait for the device subsystem (session, enumeration, scanners)
///
/// All methods take `&self`; implementations synchronise internally so the
/// cancellation monitor can close a scanner from its own thread.
pub trait DeviceSubsystem: Send + Sync {
    /// Open the subsystem session
    fn open_session(&self) -> Result<()>;

    /// Close the subsystem session
    fn close_session(&self);

    /// List the available scanners
    fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Open a scanner
    fn open_device(&self, descriptor: &DeviceDescriptor) -> Result<DeviceHandle>;

    /// Close a scanner. Closing an already closed handle is a no-op.
    fn close_device(&self, handle: DeviceHandle);

    /// Whether `handle` refers to an open scanner
    fn is_open(&self, handle: DeviceHandle) -> bool;

    /// Query one capability
    fn get_capability(&self, handle: DeviceHandle, capability: Capability)
        -> Result<CapabilityInfo>;

    /// Write one capability
    fn set_capability(
        &self,
        handle: DeviceHandle,
        capability: Capability,
        value: CapValue,
    ) -> Result<()>;

    /// Enable the scanner for acquisition and subscribe to its callbacks
    fn enable(&self, handle: DeviceHandle, mode: EnableMode) -> Result<EventChannel>;
}
