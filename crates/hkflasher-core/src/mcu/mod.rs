//! MCU geometry definitions
//!
//! The HalfKay bootloader does not report its memory layout, so the caller
//! must name the part. Each entry maps an MCU or board name to the total
//! program memory and the bootloader's block size.

#[cfg(feature = "std")]
mod database;

#[cfg(feature = "std")]
pub use database::{McuDatabase, McuDbError, McuEntry, Size};

use crate::error::{Error, Result};

/// Program memory layout of a HalfKay device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct McuGeometry {
    /// Total addressable program memory in bytes
    pub code_size: u32,
    /// Bootloader write granularity in bytes
    pub block_size: u32,
}

impl McuGeometry {
    /// Create a geometry, rejecting zero sizes
    pub fn new(code_size: u32, block_size: u32) -> Result<Self> {
        if code_size == 0 || block_size == 0 {
            return Err(Error::InvalidGeometry);
        }
        Ok(Self {
            code_size,
            block_size,
        })
    }

    /// Number of blocks covering the program memory
    pub fn block_count(&self) -> u32 {
        self.code_size.div_ceil(self.block_size)
    }

    /// Percentage of program memory used by `bytes` of firmware
    pub fn usage_percent(&self, bytes: usize) -> f64 {
        bytes as f64 / self.code_size as f64 * 100.0
    }
}

/// A named MCU or board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mcu {
    /// Name accepted by `--mcu` (matched case-insensitively)
    pub name: &'static str,
    /// Memory layout
    pub geometry: McuGeometry,
}

const fn mcu(name: &'static str, code_size: u32, block_size: u32) -> Mcu {
    Mcu {
        name,
        geometry: McuGeometry {
            code_size,
            block_size,
        },
    }
}

/// Built-in MCU table
pub const MCUS: &[Mcu] = &[
    mcu("at90usb162", 15872, 128),
    mcu("atmega32u4", 32256, 128),
    mcu("at90usb646", 64512, 256),
    mcu("at90usb1286", 130048, 256),
    mcu("mkl26z64", 63488, 512),
    mcu("mk20dx128", 131072, 1024),
    mcu("mk20dx256", 262144, 1024),
    mcu("mk66fx1m0", 1048576, 1024),
    mcu("mk64fx512", 524288, 1024),
    mcu("imxrt1062", 2031616, 1024),
    // Board names as used by the Arduino boards.txt
    mcu("TEENSY2", 32256, 128),
    mcu("TEENSY2PP", 130048, 256),
    mcu("TEENSYLC", 63488, 512),
    mcu("TEENSY30", 131072, 1024),
    mcu("TEENSY31", 262144, 1024),
    mcu("TEENSY32", 262144, 1024),
    mcu("TEENSY35", 524288, 1024),
    mcu("TEENSY36", 1048576, 1024),
    mcu("TEENSY40", 2031616, 1024),
    mcu("TEENSY41", 8126464, 1024),
    mcu("TEENSY_MICROMOD", 16515072, 1024),
];

/// Look up a built-in MCU by name, ignoring ASCII case
pub fn find(name: &str) -> Option<&'static Mcu> {
    MCUS.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_case_insensitive() {
        let mcu = find("teensy40").unwrap();
        assert_eq!(mcu.name, "TEENSY40");
        assert_eq!(mcu.geometry.code_size, 2031616);
        assert_eq!(mcu.geometry.block_size, 1024);

        assert_eq!(find("ATMEGA32U4").unwrap().geometry.block_size, 128);
        assert!(find("atmega328p").is_none());
    }

    #[test]
    fn test_table_is_valid() {
        for mcu in MCUS {
            assert!(McuGeometry::new(mcu.geometry.code_size, mcu.geometry.block_size).is_ok());
        }
    }

    #[test]
    fn test_geometry_rejects_zero() {
        assert_eq!(McuGeometry::new(0, 1024), Err(Error::InvalidGeometry));
        assert_eq!(McuGeometry::new(1024, 0), Err(Error::InvalidGeometry));
    }

    #[test]
    fn test_block_count_and_usage() {
        let geometry = find("at90usb162").unwrap().geometry;
        assert_eq!(geometry.block_count(), 124);

        let geometry = McuGeometry::new(1000, 100).unwrap();
        assert_eq!(geometry.usage_percent(250), 25.0);
    }
}
