//! Complete flashing sessions
//!
//! A [`Session`] takes a HEX file from disk to a running board:
//!
//! ```text
//! Parsing -> AwaitingDevice -> Programming -> Rebooting -> Done
//! ```
//!
//! The file is parsed before any USB access so bad input is reported early.
//! If the bootloader only shows up after waiting, the file is parsed again
//! to pick up edits made in the meantime.

use std::path::Path;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::error::Error;
use crate::halfkay::{
    self, BlockProgrammer, PacketLayout, ProgramProgress, ProgramStats, WritePolicy,
};
use crate::ihex::{self, LoadError, LoadedImage, ParseOptions};
use crate::mcu::McuGeometry;
use crate::transport::DeviceProvider;

/// Interval between attempts to open the bootloader
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Errors that end a session
#[derive(Debug, Error)]
pub enum SessionError {
    /// Programming was requested without a HEX file
    #[error("Filename must be specified")]
    MissingFilename,

    /// The MCU geometry cannot be programmed
    #[error("{0}")]
    Config(#[source] Error),

    /// The HEX file could not be loaded
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The bootloader is not present and waiting was not requested
    #[error("Unable to open device (hint: try -w option)")]
    DeviceUnavailable,

    /// A hard reboot was requested but no rebootor answered
    #[error("Unable to find rebootor")]
    RebootorNotFound,

    /// Programming failed part way through
    #[error("{0}")]
    Program(#[source] Error),
}

/// Session switches, mirroring the command line flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Keep polling until the bootloader appears
    pub wait: bool,
    /// Use the rebootor helper if the bootloader is absent
    pub hard_reboot: bool,
    /// Ask the running board's serial interface to reboot if absent
    pub soft_reboot: bool,
    /// Start the application after programming
    pub reboot_after: bool,
    /// Only send the boot request
    pub boot_only: bool,
    /// Delay between open attempts while waiting
    pub poll_interval: Duration,
    /// HEX parser switches
    pub parse: ParseOptions,
    /// Block write timing
    pub policy: WritePolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            wait: false,
            hard_reboot: false,
            soft_reboot: false,
            reboot_after: true,
            boot_only: false,
            poll_interval: POLL_INTERVAL,
            parse: ParseOptions::default(),
            policy: WritePolicy::default(),
        }
    }
}

/// What a finished session did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Data bytes in the programmed image
    pub byte_count: Option<usize>,
    /// True if the bootloader had to be waited for
    pub waited: bool,
    /// Programming summary, absent for boot-only sessions
    pub stats: Option<ProgramStats>,
    /// True if the boot request was delivered
    pub booted: bool,
}

/// One programming run against a device provider
pub struct Session<'a, D: DeviceProvider> {
    provider: &'a mut D,
    geometry: McuGeometry,
    options: SessionOptions,
}

impl<'a, D: DeviceProvider> Session<'a, D> {
    /// Create a session for a device with `geometry`
    pub fn new(provider: &'a mut D, geometry: McuGeometry, options: SessionOptions) -> Self {
        Self {
            provider,
            geometry,
            options,
        }
    }

    /// Run the session to completion
    ///
    /// `hex` may be `None` only for boot-only sessions. The device is closed
    /// when this returns, on every path.
    pub fn run<P>(
        &mut self,
        hex: Option<&Path>,
        progress: &mut P,
    ) -> Result<SessionReport, SessionError>
    where
        P: ProgramProgress + ?Sized,
    {
        let mut report = SessionReport::default();

        let mut loaded = None;
        if !self.options.boot_only {
            let path = hex.ok_or(SessionError::MissingFilename)?;
            PacketLayout::select(self.geometry).map_err(SessionError::Config)?;
            loaded = Some(self.load(path)?);
        }

        let (mut device, waited) = self.await_device()?;
        report.waited = waited;
        log::info!("Found HalfKay Bootloader");

        let packet_len = halfkay::boot_packet_len(self.geometry.block_size);

        if self.options.boot_only {
            report.booted = self.boot(&mut device, packet_len);
            return Ok(report);
        }

        let Some(path) = hex else {
            return Err(SessionError::MissingFilename);
        };
        let loaded = match loaded {
            Some(loaded) if !waited => loaded,
            _ => self.load(path)?,
        };
        report.byte_count = Some(loaded.byte_count);

        let programmer = BlockProgrammer::new(&loaded.image, self.geometry, self.options.policy)
            .map_err(SessionError::Config)?;
        let stats = programmer
            .program(&mut device, progress)
            .map_err(SessionError::Program)?;
        report.stats = Some(stats);

        if self.options.reboot_after {
            report.booted = self.boot(&mut device, programmer.packet_len());
        }

        Ok(report)
    }

    fn load(&self, path: &Path) -> Result<LoadedImage, SessionError> {
        let loaded = ihex::load_file(path, self.geometry, self.options.parse)?;
        log::info!(
            "Read \"{}\": {} bytes, {:.1}% usage",
            path.display(),
            loaded.byte_count,
            self.geometry.usage_percent(loaded.byte_count)
        );
        Ok(loaded)
    }

    /// Poll for the bootloader, using the reboot helpers once each
    fn await_device(&mut self) -> Result<(D::Device, bool), SessionError> {
        let mut wait = self.options.wait;
        let mut hard_reboot = self.options.hard_reboot;
        let mut soft_reboot = self.options.soft_reboot;
        let mut waited = false;

        loop {
            match self.provider.open_bootloader() {
                Ok(Some(device)) => return Ok((device, waited)),
                Ok(None) => {}
                Err(e) => log::debug!("Bootloader open failed: {}", e),
            }

            if hard_reboot {
                match self.provider.hard_reboot() {
                    Ok(true) => log::info!("Hard Reboot performed"),
                    Ok(false) => return Err(SessionError::RebootorNotFound),
                    Err(e) => {
                        log::warn!("Rebootor request failed: {}", e);
                        return Err(SessionError::RebootorNotFound);
                    }
                }
                hard_reboot = false;
                wait = true;
            }

            if soft_reboot {
                match self.provider.soft_reboot() {
                    Ok(true) => log::info!("Soft reboot performed"),
                    Ok(false) => log::warn!("No serial device found for soft reboot"),
                    Err(e) => log::warn!("Unable to soft reboot: {}", e),
                }
                soft_reboot = false;
                wait = true;
            }

            if !wait {
                return Err(SessionError::DeviceUnavailable);
            }

            if !waited {
                log::info!("Waiting for Teensy device...");
                log::info!(" (hint: press the reset button)");
                waited = true;
            }
            thread::sleep(self.options.poll_interval);
        }
    }

    fn boot(&self, device: &mut D::Device, packet_len: usize) -> bool {
        match halfkay::boot(device, packet_len) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Boot request not acknowledged: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::halfkay::NoProgress;
    use crate::transport::HalfKayTransport;

    struct NullDevice;

    impl HalfKayTransport for NullDevice {
        fn write(&mut self, _packet: &[u8], _timeout: Duration) -> crate::Result<()> {
            Ok(())
        }
    }

    /// Bootloader appears after `absent_polls` failed opens
    #[derive(Default)]
    struct Provider {
        absent_polls: usize,
        opens: usize,
        rebootor: bool,
        hard_reboots: usize,
        soft_reboots: usize,
    }

    impl DeviceProvider for Provider {
        type Device = NullDevice;

        fn open_bootloader(&mut self) -> crate::Result<Option<NullDevice>> {
            self.opens += 1;
            if self.opens > self.absent_polls {
                Ok(Some(NullDevice))
            } else {
                Ok(None)
            }
        }

        fn hard_reboot(&mut self) -> crate::Result<bool> {
            self.hard_reboots += 1;
            Ok(self.rebootor)
        }

        fn soft_reboot(&mut self) -> crate::Result<bool> {
            self.soft_reboots += 1;
            Ok(false)
        }
    }

    fn geometry() -> McuGeometry {
        McuGeometry::new(1048576, 1024).unwrap()
    }

    fn options() -> SessionOptions {
        SessionOptions {
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_filename() {
        let mut provider = Provider::default();
        let mut session = Session::new(&mut provider, geometry(), options());

        let err = session.run(None, &mut NoProgress).unwrap_err();
        assert!(matches!(err, SessionError::MissingFilename));
        assert_eq!(provider.opens, 0);
    }

    #[test]
    fn test_device_unavailable_without_wait() {
        let mut provider = Provider {
            absent_polls: 1,
            ..Default::default()
        };
        let mut session = Session::new(&mut provider, geometry(), SessionOptions {
            boot_only: true,
            ..options()
        });

        let err = session.run(None, &mut NoProgress).unwrap_err();
        assert!(matches!(err, SessionError::DeviceUnavailable));
        assert_eq!(provider.opens, 1);
    }

    #[test]
    fn test_boot_only_waits() {
        let mut provider = Provider {
            absent_polls: 3,
            ..Default::default()
        };
        let mut session = Session::new(&mut provider, geometry(), SessionOptions {
            boot_only: true,
            wait: true,
            ..options()
        });

        let report = session.run(None, &mut NoProgress).unwrap();
        assert!(report.waited);
        assert!(report.booted);
        assert!(report.stats.is_none());
        assert_eq!(provider.opens, 4);
    }

    #[test]
    fn test_missing_rebootor() {
        let mut provider = Provider {
            absent_polls: 1,
            ..Default::default()
        };
        let mut session = Session::new(&mut provider, geometry(), SessionOptions {
            boot_only: true,
            hard_reboot: true,
            ..options()
        });

        let err = session.run(None, &mut NoProgress).unwrap_err();
        assert!(matches!(err, SessionError::RebootorNotFound));
    }

    #[test]
    fn test_reboot_helpers_used_once() {
        let mut provider = Provider {
            absent_polls: 5,
            rebootor: true,
            ..Default::default()
        };
        let mut session = Session::new(&mut provider, geometry(), SessionOptions {
            boot_only: true,
            hard_reboot: true,
            soft_reboot: true,
            ..options()
        });

        session.run(None, &mut NoProgress).unwrap();
        assert_eq!(provider.hard_reboots, 1);
        assert_eq!(provider.soft_reboots, 1);
    }

    #[test]
    fn test_config_error_before_device_io() {
        let mut provider = Provider::default();
        let geometry = McuGeometry::new(0x20000, 2048).unwrap();
        let mut session = Session::new(&mut provider, geometry, options());

        let err = session
            .run(Some(Path::new("unused.hex")), &mut NoProgress)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Config(Error::UnsupportedGeometry { .. })
        ));
        assert_eq!(provider.opens, 0);
    }

    #[test]
    fn test_load_error_before_device_io() {
        let mut provider = Provider::default();
        let mut session = Session::new(&mut provider, geometry(), options());

        let path = std::env::temp_dir().join("hkflasher-session-does-not-exist.hex");
        let err = session.run(Some(&path), &mut NoProgress).unwrap_err();
        assert!(matches!(err, SessionError::Load(LoadError::Open { .. })));
        assert_eq!(provider.opens, 0);
    }
}
