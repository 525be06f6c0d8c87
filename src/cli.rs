//! CLI argument parsing

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hkflasher")]
#[command(author, version, about = "HalfKay bootloader programmer", long_about = None)]
pub struct Cli {
    /// Wait for the device to appear
    #[arg(short, long)]
    pub wait: bool,

    /// Use a rebootor to reboot the board into the bootloader
    #[arg(short = 'r', long)]
    pub hard_reboot: bool,

    /// Ask the board's serial interface to reboot into the bootloader
    #[arg(short, long)]
    pub soft_reboot: bool,

    /// Do not reboot after programming
    #[arg(short, long)]
    pub no_reboot: bool,

    /// Only boot, do not program
    #[arg(short, long)]
    pub boot_only: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// MCU or board name (see --list-mcus)
    #[arg(long)]
    pub mcu: Option<String>,

    /// List supported MCUs and exit
    #[arg(long)]
    pub list_mcus: bool,

    /// Extra MCU definitions (RON file)
    #[arg(long, value_name = "FILE")]
    pub mcu_db: Option<PathBuf>,

    /// Program an emulated device instead of USB hardware
    #[arg(long)]
    pub dummy: bool,

    /// Fail on bad extended address record checksums instead of ignoring them
    #[arg(long)]
    pub strict: bool,

    /// Intel HEX file to program
    pub file: Option<PathBuf>,
}

/// Rewrite the legacy `-mmcu=<name>` spelling to `--mcu=<name>`
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(|arg| {
            let arg = arg.into();
            match arg.to_str().and_then(|s| s.strip_prefix("-mmcu=")) {
                Some(name) => OsString::from(format!("--mcu={}", name)),
                None => arg,
            }
        })
        .collect()
}
