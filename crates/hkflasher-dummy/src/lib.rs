//! hkflasher-dummy - In-memory HalfKay emulator for testing
//!
//! This crate provides a fake bootloader that decodes HalfKay packets into
//! an in-memory flash array. It is useful for trying the flasher without a
//! board attached and for testing complete sessions.
//!
//! Like the real bootloader, the emulated flash is erased by the first block
//! write, and a packet addressed past the end of flash with the boot marker
//! starts the "application".

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::time::Duration;

use hkflasher_core::error::{Error, Result};
use hkflasher_core::halfkay::{is_boot_packet, PacketLayout};
use hkflasher_core::image::ERASED_VALUE;
use hkflasher_core::mcu::McuGeometry;
use hkflasher_core::transport::{DeviceProvider, HalfKayTransport};

/// Configuration for the emulated device
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Memory layout of the emulated MCU
    pub geometry: McuGeometry,
    /// Failed opens before the bootloader appears
    pub absent_polls: usize,
    /// A rebootor is attached
    pub rebootor: bool,
    /// The board is running serial firmware that accepts a soft reboot
    pub serial: bool,
    /// Number of leading write attempts that fail before any succeed
    pub transient_failures: usize,
    /// Every write after this many accepted packets fails
    pub fail_after: Option<usize>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            // Teensy 3.6
            geometry: McuGeometry {
                code_size: 1048576,
                block_size: 1024,
            },
            absent_polls: 0,
            rebootor: false,
            serial: false,
            transient_failures: 0,
            fail_after: None,
        }
    }
}

/// Everything the emulated device has seen
#[derive(Debug, Clone)]
pub struct DummyState {
    /// Flash contents
    pub flash: Vec<u8>,
    /// Block addresses in the order they were written
    pub writes: Vec<u32>,
    /// Boot packets received
    pub boots: usize,
    /// Bootloader open attempts
    pub opens: usize,
    /// Rebootor requests
    pub hard_reboots: usize,
    /// Serial reboot requests
    pub soft_reboots: usize,
    /// Write attempts that were refused
    pub rejected: usize,
    erased: bool,
    transient_failures: usize,
}

impl DummyState {
    fn new(config: &DummyConfig) -> Self {
        Self {
            flash: vec![0x00; config.geometry.code_size as usize],
            writes: Vec::new(),
            boots: 0,
            opens: 0,
            hard_reboots: 0,
            soft_reboots: 0,
            rejected: 0,
            erased: false,
            transient_failures: config.transient_failures,
        }
    }

    /// True once the first block write has erased the chip
    pub fn erased(&self) -> bool {
        self.erased
    }

    /// Flash contents of `len` bytes at `addr`
    pub fn read(&self, addr: u32, len: usize) -> &[u8] {
        let start = addr as usize;
        &self.flash[start..start + len]
    }
}

/// Dummy bootloader provider
///
/// Hands out [`DummyHalfKay`] handles that share one flash array, so the
/// state stays inspectable after a session drops its device.
#[derive(Debug)]
pub struct DummyProvider {
    config: DummyConfig,
    state: Rc<RefCell<DummyState>>,
}

impl DummyProvider {
    /// Create an emulated device
    pub fn new(config: DummyConfig) -> Self {
        let state = Rc::new(RefCell::new(DummyState::new(&config)));
        Self { config, state }
    }

    /// Create an emulated Teensy 3.6 that is already in the bootloader
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Emulated memory layout
    pub fn geometry(&self) -> McuGeometry {
        self.config.geometry
    }

    /// Borrow the device state
    pub fn state(&self) -> Ref<'_, DummyState> {
        self.state.borrow()
    }

    /// Flash contents
    pub fn flash(&self) -> Vec<u8> {
        self.state.borrow().flash.clone()
    }
}

impl DeviceProvider for DummyProvider {
    type Device = DummyHalfKay;

    fn open_bootloader(&mut self) -> Result<Option<DummyHalfKay>> {
        let mut state = self.state.borrow_mut();
        state.opens += 1;
        if state.opens <= self.config.absent_polls {
            return Ok(None);
        }
        let layout = PacketLayout::select(self.config.geometry)?;
        log::debug!("Dummy HalfKay opened ({:?} packets)", layout);
        Ok(Some(DummyHalfKay {
            geometry: self.config.geometry,
            layout,
            fail_after: self.config.fail_after,
            state: Rc::clone(&self.state),
        }))
    }

    fn hard_reboot(&mut self) -> Result<bool> {
        if !self.config.rebootor {
            return Ok(false);
        }
        self.state.borrow_mut().hard_reboots += 1;
        Ok(true)
    }

    fn soft_reboot(&mut self) -> Result<bool> {
        if !self.config.serial {
            return Ok(false);
        }
        self.state.borrow_mut().soft_reboots += 1;
        Ok(true)
    }
}

/// An open emulated bootloader
#[derive(Debug)]
pub struct DummyHalfKay {
    geometry: McuGeometry,
    layout: PacketLayout,
    fail_after: Option<usize>,
    state: Rc<RefCell<DummyState>>,
}

impl HalfKayTransport for DummyHalfKay {
    fn write(&mut self, packet: &[u8], _timeout: Duration) -> Result<()> {
        let mut state = self.state.borrow_mut();

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            state.rejected += 1;
            return Err(Error::TransferFailed);
        }
        if packet.len() != self.layout.packet_len(self.geometry.block_size) {
            log::warn!("Dummy HalfKay: unexpected packet length {}", packet.len());
            state.rejected += 1;
            return Err(Error::TransferFailed);
        }

        let addr = self.layout.decode_address(packet);
        if addr >= self.geometry.code_size {
            if is_boot_packet(packet) {
                log::debug!("Dummy HalfKay: boot");
                state.boots += 1;
                return Ok(());
            }
            state.rejected += 1;
            return Err(Error::AddressOutOfRange { addr: addr as u64 });
        }

        let accepted = state.writes.len() + state.boots;
        if self.fail_after.is_some_and(|n| accepted >= n) {
            state.rejected += 1;
            return Err(Error::TransferFailed);
        }

        if !state.erased {
            log::debug!("Dummy HalfKay: chip erase");
            state.flash.fill(ERASED_VALUE);
            state.erased = true;
        }

        let data = &packet[self.layout.header_len()..];
        let start = addr as usize;
        let end = (start + data.len()).min(state.flash.len());
        state.flash[start..end].copy_from_slice(&data[..end - start]);
        state.writes.push(addr);
        log::trace!("Dummy HalfKay: block 0x{:06X}", addr);
        Ok(())
    }
}
