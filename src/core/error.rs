//! Error types for the scanner tool
//!
//! This module defines the error types used throughout the application.
//! Capability skips and single-page decode failures are not errors at the
//! session level; they are logged where they happen and never surface here.

use crate::device::traits::{Capability, ReturnCode};
use thiserror::Error;

/// Main error type for the scanner tool
#[derive(Error, Debug)]
pub enum ScanError {
    /// The device subsystem (data source manager) could not be opened
    #[error("Failed to open device session: {0}")]
    SessionOpen(ReturnCode),

    /// The session opened but reported no scanners
    #[error("No scanners found")]
    NoDevicesFound,

    /// A selector was given and no scanner name contains it
    #[error("No scanner found with name containing '{0}'")]
    DeviceNotFound(String),

    /// The selected scanner refused to open
    #[error("Failed to open scanner '{name}': {code}")]
    DeviceOpen { name: String, code: ReturnCode },

    /// The scanner refused to enter the enabled state
    #[error("Failed to enable scanner: {0}")]
    Enable(ReturnCode),

    /// A capability could not be read or written
    #[error("Capability {capability} failed: {code}")]
    Capability {
        capability: Capability,
        code: ReturnCode,
    },

    /// An operation referenced a handle that is not open
    #[error("Scanner handle {0} is not open")]
    InvalidHandle(u32),

    /// General device communication error
    #[error("Device error: {0}")]
    DeviceError(String),

    /// A transferred buffer could not be decoded as an image
    #[error("Failed to decode transferred image: {0}")]
    Decode(String),

    /// General I/O error
    #[error("IO error: {0}")]
    IoError(String),

    /// The cancellation trigger watch could not be set up
    #[error("File watch error: {0}")]
    WatchError(String),
}

impl ScanError {
    /// Status code reported by the driver, if this error carries one
    pub fn return_code(&self) -> Option<ReturnCode> {
        match self {
            ScanError::SessionOpen(code)
            | ScanError::Enable(code)
            | ScanError::DeviceOpen { code, .. }
            | ScanError::Capability { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ScanError>;

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::IoError(err.to_string())
    }
}

impl From<image::ImageError> for ScanError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => ScanError::IoError(e.to_string()),
            other => ScanError::Decode(other.to_string()),
        }
    }
}

impl From<notify::Error> for ScanError {
    fn from(err: notify::Error) -> Self {
        ScanError::WatchError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_code_extraction() {
        let err = ScanError::Enable(ReturnCode::Failure);
        assert_eq!(err.return_code(), Some(ReturnCode::Failure));

        let err = ScanError::DeviceOpen {
            name: "EPSON".to_string(),
            code: ReturnCode::Busy,
        };
        assert_eq!(err.return_code(), Some(ReturnCode::Busy));

        assert_eq!(ScanError::NoDevicesFound.return_code(), None);
    }

    #[test]
    fn test_error_messages() {
        let err = ScanError::DeviceNotFound("canon".to_string());
        assert_eq!(
            err.to_string(),
            "No scanner found with name containing 'canon'"
        );

        let err = ScanError::SessionOpen(ReturnCode::Failure);
        assert_eq!(err.to_string(), "Failed to open device session: Failure");
    }

    #[test]
    fn test_image_error_maps_to_decode() {
        let err = image::load_from_memory(b"definitely not an image").unwrap_err();
        assert!(matches!(ScanError::from(err), ScanError::Decode(_)));
    }
}
