//! Error types for USB access

use hkflasher_core::error::Error as CoreError;
use thiserror::Error;

/// Result type for USB operations
pub type Result<T> = std::result::Result<T, UsbError>;

/// Errors that can occur talking to HalfKay and its helpers
#[derive(Debug, Error)]
pub enum UsbError {
    /// Device enumeration failed
    #[error("USB enumeration failed: {0}")]
    ListFailed(String),

    /// No device with the wanted ids is attached
    #[error("device not found (VID:{vid:04x} PID:{pid:04x})")]
    DeviceNotFound {
        /// USB vendor id
        vid: u16,
        /// USB product id
        pid: u16,
    },

    /// The device was found but could not be opened
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// Interface 0 could not be claimed
    #[error("failed to claim interface: {0}")]
    ClaimFailed(String),

    /// A control transfer did not complete
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),
}

impl From<UsbError> for CoreError {
    fn from(e: UsbError) -> Self {
        match e {
            UsbError::DeviceNotFound { .. } => CoreError::DeviceNotFound,
            _ => CoreError::TransferFailed,
        }
    }
}
