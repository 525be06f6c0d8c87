//! hkflasher-core - Core library for HalfKay bootloader programming
//!
//! This crate turns Intel HEX firmware into the block writes understood by
//! the HalfKay USB bootloader. The parsing and packet building parts only
//! need `alloc`; file loading, timed write retries and the device session
//! state machine require the `std` feature.
//!
//! # Features
//!
//! - `std` - Enable file loading, sessions and RON MCU tables (default)
//!
//! # Example
//!
//! ```ignore
//! use hkflasher_core::halfkay::{BlockProgrammer, NoProgress, WritePolicy};
//! use hkflasher_core::ihex::load_file;
//! use hkflasher_core::mcu;
//!
//! fn flash<T: hkflasher_core::transport::HalfKayTransport>(
//!     device: &mut T,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let geometry = mcu::find("teensy40").ok_or("unknown MCU")?.geometry;
//!     let loaded = load_file("blink.hex", geometry, Default::default())?;
//!     let programmer = BlockProgrammer::new(&loaded.image, geometry, WritePolicy::default())?;
//!     programmer.program(device, &mut NoProgress)?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

pub mod error;
pub mod halfkay;
pub mod ihex;
pub mod image;
pub mod mcu;
#[cfg(feature = "std")]
pub mod session;
pub mod transport;

pub use error::{Error, Result};
