//! Device access traits
//!
//! Backends only move bytes. Retry budgets, packet layouts and the decision
//! of what to write live in [`halfkay`](crate::halfkay), so every backend
//! shares one tested policy.
//!
//! A device is closed by dropping it.

use core::time::Duration;

use crate::error::Result;

/// An open HalfKay bootloader
pub trait HalfKayTransport {
    /// Make one attempt to deliver `packet`, giving up after `timeout`
    ///
    /// Failure is reported as an error; the caller decides whether to retry.
    fn write(&mut self, packet: &[u8], timeout: Duration) -> Result<()>;
}

impl<T: HalfKayTransport + ?Sized> HalfKayTransport for &mut T {
    fn write(&mut self, packet: &[u8], timeout: Duration) -> Result<()> {
        (**self).write(packet, timeout)
    }
}

/// Finds bootloader devices and the helpers that can put a board into one
pub trait DeviceProvider {
    /// Handle type for an open bootloader
    type Device: HalfKayTransport;

    /// Try to open the bootloader; `Ok(None)` when it is not present
    fn open_bootloader(&mut self) -> Result<Option<Self::Device>>;

    /// Ask a rebootor helper to reset the board; `false` if none was found
    fn hard_reboot(&mut self) -> Result<bool>;

    /// Ask a running board's serial interface to enter the bootloader
    fn soft_reboot(&mut self) -> Result<bool>;
}
