//! Error types for hkflasher-core
//!
//! This module provides a no_std compatible error type shared by the image,
//! packet and programming code.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Image errors
    /// Address lies beyond the memory image capacity
    AddressOutOfRange {
        /// Offending absolute address
        addr: u64,
    },

    // Configuration errors
    /// Code size or block size is zero
    InvalidGeometry,
    /// No packet layout exists for this block size / code size pairing
    UnsupportedGeometry {
        /// Total program memory in bytes
        code_size: u32,
        /// Bootloader write granularity in bytes
        block_size: u32,
    },

    // Device errors
    /// Bootloader device not present
    DeviceNotFound,
    /// A block write did not succeed within its time budget
    WriteTimeout {
        /// Address of the block being written
        addr: u32,
    },
    /// A single transfer attempt failed
    TransferFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressOutOfRange { addr } => {
                write!(f, "address 0x{:08X} is outside the memory image", addr)
            }
            Self::InvalidGeometry => write!(f, "code size and block size must be non-zero"),
            Self::UnsupportedGeometry {
                code_size,
                block_size,
            } => write!(
                f,
                "unknown code/block size: {} byte blocks with {} bytes of flash",
                block_size, code_size
            ),
            Self::DeviceNotFound => write!(f, "HalfKay bootloader not found"),
            Self::WriteTimeout { addr } => {
                write!(f, "error writing block at 0x{:06X} to the device", addr)
            }
            Self::TransferFailed => write!(f, "USB transfer failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
