//! hkflasher - Program Teensy boards through the HalfKay bootloader
//!
//! Loads an Intel HEX file, waits for (or reboots into) the HalfKay
//! bootloader, writes every non-blank block and starts the new firmware.
//!
//! # Architecture
//!
//! All protocol logic lives in `hkflasher-core`, behind the
//! `DeviceProvider` / `HalfKayTransport` traits. The binary only picks a
//! backend:
//! - **usb**: real hardware through nusb
//! - **dummy**: an in-memory emulator, selected with `--dummy`

mod backends;
mod cli;
mod commands;

use std::path::Path;
use std::process;

use clap::Parser;
use cli::Cli;
use hkflasher_core::ihex::ParseOptions;
use hkflasher_core::mcu::{McuDatabase, McuGeometry};
use hkflasher_core::session::SessionOptions;
use thiserror::Error;

/// Errors raised by the command line front end
#[derive(Debug, Error)]
enum CliError {
    #[error("MCU type must be specified (use --mcu, see --list-mcus)")]
    MissingMcu,

    #[error("Unknown MCU type \"{0}\" (see --list-mcus)")]
    UnknownMcu(String),

    #[cfg_attr(all(feature = "usb", feature = "dummy"), allow(dead_code))]
    #[error("The {0} backend was not compiled in")]
    BackendUnavailable(&'static str),
}

fn main() {
    let cli = match Cli::try_parse_from(cli::normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not failures
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.to_string()))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    log::debug!("Backends: {}", backends::backend_names());

    let mut db = McuDatabase::new();
    if let Some(path) = &cli.mcu_db {
        let count = db.load_file(path)?;
        log::info!("Loaded {} MCU definitions from {}", count, path.display());
    }

    if cli.list_mcus {
        commands::list_mcus(&db);
        return Ok(());
    }

    let name = cli.mcu.as_deref().ok_or(CliError::MissingMcu)?;
    let entry = db
        .find(name)
        .ok_or_else(|| CliError::UnknownMcu(name.to_string()))?;
    log::debug!(
        "MCU {}: {} bytes flash, {} byte blocks",
        entry.name,
        entry.geometry.code_size,
        entry.geometry.block_size
    );

    let options = SessionOptions {
        wait: cli.wait,
        hard_reboot: cli.hard_reboot,
        soft_reboot: cli.soft_reboot,
        reboot_after: !cli.no_reboot,
        boot_only: cli.boot_only,
        parse: ParseOptions {
            strict_extended_checksum: cli.strict,
        },
        ..Default::default()
    };
    let file = cli.file.as_deref();
    let show_progress = cli.verbose > 0;

    if cli.dummy {
        run_dummy(entry.geometry, options, file, show_progress)
    } else {
        run_usb(entry.geometry, options, file, show_progress)
    }
}

#[cfg(feature = "usb")]
fn run_usb(
    geometry: McuGeometry,
    options: SessionOptions,
    file: Option<&Path>,
    show_progress: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut provider = hkflasher_usb::UsbProvider::new();
    commands::run_program(&mut provider, geometry, options, file, show_progress)?;
    Ok(())
}

#[cfg(not(feature = "usb"))]
fn run_usb(
    _geometry: McuGeometry,
    _options: SessionOptions,
    _file: Option<&Path>,
    _show_progress: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    Err(CliError::BackendUnavailable("usb").into())
}

#[cfg(feature = "dummy")]
fn run_dummy(
    geometry: McuGeometry,
    options: SessionOptions,
    file: Option<&Path>,
    show_progress: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    use hkflasher_dummy::{DummyConfig, DummyProvider};

    let mut provider = DummyProvider::new(DummyConfig {
        geometry,
        ..Default::default()
    });
    let report = commands::run_program(&mut provider, geometry, options, file, show_progress)?;

    let state = provider.state();
    println!(
        "Emulated device: {} blocks written, {} boot requests",
        state.writes.len(),
        state.boots
    );
    if let Some(stats) = report.stats {
        println!(
            "{} blocks skipped, {} bytes sent",
            stats.blocks_skipped, stats.bytes_sent
        );
    }
    Ok(())
}

#[cfg(not(feature = "dummy"))]
fn run_dummy(
    _geometry: McuGeometry,
    _options: SessionOptions,
    _file: Option<&Path>,
    _show_progress: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    Err(CliError::BackendUnavailable("dummy").into())
}
