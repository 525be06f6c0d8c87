//! HalfKay bootloader protocol
//!
//! - [`packet`]: address header layouts and the boot packet
//! - [`program`]: block selection, timed retries and the boot request

pub mod packet;
#[cfg(feature = "std")]
pub mod program;

pub use packet::{boot_packet, boot_packet_len, is_boot_packet, PacketLayout, BOOT_MARKER};
#[cfg(feature = "std")]
pub use program::{
    boot, write_with_retry, BlockProgrammer, NoProgress, ProgramProgress, ProgramStats,
    WritePolicy, BOOT_TIMEOUT,
};
