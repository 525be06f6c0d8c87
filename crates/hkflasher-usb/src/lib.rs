//! hkflasher-usb - HalfKay bootloader access over USB HID
//!
//! The HalfKay bootloader accepts flash blocks as HID output reports sent
//! with a `SET_REPORT` control request. No HID descriptor parsing is needed;
//! every report goes to interface 0 with report type "output" and id 0.
//!
//! Two helpers can put a running board into the bootloader:
//!
//! - the rebootor, a separate board that pulls the target's reset line
//! - the target's own USB serial port, which reboots when the host sets
//!   the line rate to 134 baud
//!
//! # Example
//!
//! ```no_run
//! use hkflasher_core::transport::DeviceProvider;
//! use hkflasher_usb::UsbProvider;
//!
//! let mut usb = UsbProvider::new();
//! match usb.open_bootloader()? {
//!     Some(_device) => println!("HalfKay bootloader present"),
//!     None => println!("press the reset button"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod error;

pub use device::{
    HalfKay, UsbProvider, HALFKAY_PID, REBOOTOR_PID, SERIAL_PID, TEENSY_VID,
};
pub use error::{Result, UsbError};
