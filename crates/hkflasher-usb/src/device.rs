//! HalfKay device handling using nusb

use std::time::Duration;

use hkflasher_core::error::Result as CoreResult;
use hkflasher_core::transport::{DeviceProvider, HalfKayTransport};
use nusb::transfer::{ControlOut, ControlType, Recipient};
use nusb::{DeviceInfo, Interface, MaybeFuture};

use crate::error::{Result, UsbError};

/// Vendor id shared by HalfKay, the rebootor and Teensy serial firmware
pub const TEENSY_VID: u16 = 0x16C0;
/// HalfKay bootloader product id
pub const HALFKAY_PID: u16 = 0x0478;
/// Rebootor product id
pub const REBOOTOR_PID: u16 = 0x0477;
/// Teensy USB serial product id
pub const SERIAL_PID: u16 = 0x0483;

/// HID class SET_REPORT request
const HID_SET_REPORT: u8 = 0x09;
/// Report type "output" (2) in the high byte, report id 0
const HID_OUTPUT_REPORT: u16 = 0x0200;

/// CDC SET_LINE_CODING request
const CDC_SET_LINE_CODING: u8 = 0x20;
/// 134 baud, 1 stop bit, no parity, 8 data bits
const REBOOT_LINE_CODING: [u8; 7] = [0x86, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08];
const SERIAL_TIMEOUT: Duration = Duration::from_secs(10);

const REBOOTOR_COMMAND: &[u8] = b"reboot";
const REBOOTOR_TIMEOUT: Duration = Duration::from_millis(100);

fn find_device(vid: u16, pid: u16) -> Result<Option<DeviceInfo>> {
    let found = nusb::list_devices()
        .wait()
        .map_err(|e| UsbError::ListFailed(e.to_string()))?
        .find(|d| d.vendor_id() == vid && d.product_id() == pid);
    Ok(found)
}

/// Open `info` and claim interface 0, detaching any kernel driver
fn claim(info: &DeviceInfo) -> Result<Interface> {
    log::debug!(
        "Opening {:04x}:{:04x} at bus {} address {}",
        info.vendor_id(),
        info.product_id(),
        info.bus_id(),
        info.device_address()
    );

    let device = info
        .open()
        .wait()
        .map_err(|e| UsbError::OpenFailed(e.to_string()))?;

    device
        .detach_and_claim_interface(0)
        .wait()
        .map_err(|e| UsbError::ClaimFailed(e.to_string()))
}

fn class_out(
    interface: &Interface,
    request: u8,
    value: u16,
    data: &[u8],
    timeout: Duration,
) -> Result<()> {
    interface
        .control_out(
            ControlOut {
                control_type: ControlType::Class,
                recipient: Recipient::Interface,
                request,
                value,
                index: 0,
                data,
            },
            timeout,
        )
        .wait()
        .map_err(|e| UsbError::TransferFailed(e.to_string()))
}

/// An open HalfKay bootloader
///
/// The interface is released when this is dropped.
pub struct HalfKay {
    interface: Interface,
}

impl HalfKay {
    /// Open the first attached HalfKay bootloader
    pub fn open() -> Result<Self> {
        let info = find_device(TEENSY_VID, HALFKAY_PID)?.ok_or(UsbError::DeviceNotFound {
            vid: TEENSY_VID,
            pid: HALFKAY_PID,
        })?;
        let interface = claim(&info)?;
        Ok(Self { interface })
    }

    /// Send one HID output report
    pub fn send_report(&self, packet: &[u8], timeout: Duration) -> Result<()> {
        class_out(
            &self.interface,
            HID_SET_REPORT,
            HID_OUTPUT_REPORT,
            packet,
            timeout,
        )
    }
}

impl HalfKayTransport for HalfKay {
    fn write(&mut self, packet: &[u8], timeout: Duration) -> CoreResult<()> {
        self.send_report(packet, timeout).map_err(|e| {
            log::trace!("HalfKay write of {} bytes failed: {}", packet.len(), e);
            e.into()
        })
    }
}

/// Finds HalfKay devices and reboot helpers on the USB bus
#[derive(Debug, Default)]
pub struct UsbProvider;

impl UsbProvider {
    /// Create a provider
    pub fn new() -> Self {
        Self
    }

    /// Reset the board through an attached rebootor
    ///
    /// Returns `Ok(false)` if no rebootor is attached.
    pub fn rebootor(&self) -> Result<bool> {
        let Some(info) = find_device(TEENSY_VID, REBOOTOR_PID)? else {
            return Ok(false);
        };
        let interface = claim(&info)?;
        class_out(
            &interface,
            HID_SET_REPORT,
            HID_OUTPUT_REPORT,
            REBOOTOR_COMMAND,
            REBOOTOR_TIMEOUT,
        )?;
        Ok(true)
    }

    /// Reboot a board running Teensy serial firmware into the bootloader
    ///
    /// Returns `Ok(false)` if no such board is attached.
    pub fn serial_reboot(&self) -> Result<bool> {
        let Some(info) = find_device(TEENSY_VID, SERIAL_PID)? else {
            return Ok(false);
        };
        let interface = claim(&info)?;
        class_out(
            &interface,
            CDC_SET_LINE_CODING,
            0,
            &REBOOT_LINE_CODING,
            SERIAL_TIMEOUT,
        )?;
        Ok(true)
    }
}

impl DeviceProvider for UsbProvider {
    type Device = HalfKay;

    fn open_bootloader(&mut self) -> CoreResult<Option<HalfKay>> {
        match HalfKay::open() {
            Ok(device) => Ok(Some(device)),
            Err(UsbError::DeviceNotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn hard_reboot(&mut self) -> CoreResult<bool> {
        self.rebootor().map_err(|e| {
            log::debug!("Rebootor: {}", e);
            e.into()
        })
    }

    fn soft_reboot(&mut self) -> CoreResult<bool> {
        self.serial_reboot().map_err(|e| {
            log::debug!("Serial reboot: {}", e);
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reboot_line_coding() {
        // dwDTERate is little-endian
        let rate = u32::from_le_bytes([
            REBOOT_LINE_CODING[0],
            REBOOT_LINE_CODING[1],
            REBOOT_LINE_CODING[2],
            REBOOT_LINE_CODING[3],
        ]);
        assert_eq!(rate, 134);
        assert_eq!(REBOOT_LINE_CODING[6], 8);
    }

    #[test]
    fn test_set_report_value() {
        assert_eq!(HID_OUTPUT_REPORT >> 8, 2);
        assert_eq!(HID_OUTPUT_REPORT & 0xFF, 0);
        assert_eq!(REBOOTOR_COMMAND.len(), 6);
    }
}
