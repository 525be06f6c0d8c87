//! Block programming
//!
//! [`BlockProgrammer`] walks program memory one block at a time. The first
//! block is always written because it makes the bootloader erase the whole
//! chip; later blocks are only written when the image puts something other
//! than erased bytes into them.
//!
//! Erasing can take many seconds, so the first few writes get a much larger
//! time budget than the rest.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::image::MemoryImage;
use crate::mcu::McuGeometry;
use crate::transport::HalfKayTransport;

use super::packet::{boot_packet, PacketLayout};

/// Time budget for the boot packet
pub const BOOT_TIMEOUT: Duration = Duration::from_millis(500);

/// Timing rules for block writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    /// Number of leading writes that may wait for a chip erase
    pub early_blocks: usize,
    /// Budget for each of the leading writes
    pub early_timeout: Duration,
    /// Budget for every later write
    pub late_timeout: Duration,
    /// Pause between failed attempts
    pub retry_delay: Duration,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            early_blocks: 5,
            early_timeout: Duration::from_secs(45),
            late_timeout: Duration::from_millis(500),
            retry_delay: Duration::from_millis(10),
        }
    }
}

impl WritePolicy {
    /// Budget for the write that follows `written` successful writes
    pub fn timeout_for(&self, written: usize) -> Duration {
        if written < self.early_blocks {
            self.early_timeout
        } else {
            self.late_timeout
        }
    }
}

/// Summary of a programming run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramStats {
    /// Blocks sent to the bootloader
    pub blocks_written: usize,
    /// Blocks left out because they hold nothing to program
    pub blocks_skipped: usize,
    /// Total bytes sent, headers included
    pub bytes_sent: usize,
}

/// Progress callbacks for a programming run
pub trait ProgramProgress {
    /// Called once before the first write
    fn programming(&mut self, _total_blocks: usize) {}

    /// Called after each block write succeeds
    fn block_written(&mut self, _index: usize, _addr: u32) {}

    /// Called when every block has been written
    fn complete(&mut self, _stats: &ProgramStats) {}
}

/// Progress sink that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgramProgress for NoProgress {}

/// Writes a memory image to a HalfKay device
#[derive(Debug, Clone)]
pub struct BlockProgrammer<'a> {
    image: &'a MemoryImage,
    geometry: McuGeometry,
    layout: PacketLayout,
    policy: WritePolicy,
}

impl<'a> BlockProgrammer<'a> {
    /// Prepare to program `image` into a device with `geometry`
    ///
    /// Fails if no packet layout exists for the geometry.
    pub fn new(image: &'a MemoryImage, geometry: McuGeometry, policy: WritePolicy) -> Result<Self> {
        let layout = PacketLayout::select(geometry)?;
        Ok(Self {
            image,
            geometry,
            layout,
            policy,
        })
    }

    /// Selected packet layout
    pub fn layout(&self) -> PacketLayout {
        self.layout
    }

    /// Size of each block packet
    pub fn packet_len(&self) -> usize {
        self.layout.packet_len(self.geometry.block_size)
    }

    /// Whether the block at `addr` must be sent after `written` earlier writes
    pub fn should_write(&self, addr: u32, written: usize) -> bool {
        if written == 0 {
            return true;
        }
        let block_size = self.geometry.block_size;
        let last = addr.saturating_add(block_size - 1);
        self.image.has_any_data(addr, last) && !self.image.is_blank(addr, block_size as usize)
    }

    /// Addresses of the blocks that [`program`](Self::program) will write
    pub fn plan(&self) -> Vec<u32> {
        let mut blocks = Vec::new();
        for addr in self.block_addresses() {
            if self.should_write(addr, blocks.len()) {
                blocks.push(addr);
            }
        }
        blocks
    }

    fn block_addresses(&self) -> impl Iterator<Item = u32> {
        (0..self.geometry.code_size).step_by(self.geometry.block_size as usize)
    }

    /// Write every planned block, aborting on the first failed write
    ///
    /// Blocks already written stay on the device when a later one fails.
    pub fn program<T, P>(&self, transport: &mut T, progress: &mut P) -> Result<ProgramStats>
    where
        T: HalfKayTransport + ?Sized,
        P: ProgramProgress + ?Sized,
    {
        let plan = self.plan();
        let mut stats = ProgramStats {
            blocks_skipped: self.geometry.block_count() as usize - plan.len(),
            ..Default::default()
        };
        let mut packet = vec![0u8; self.packet_len()];

        log::info!(
            "Programming {} of {} blocks ({} byte packets)",
            plan.len(),
            self.geometry.block_count(),
            packet.len()
        );
        progress.programming(plan.len());

        for (index, &addr) in plan.iter().enumerate() {
            self.layout.build(addr, self.image, &mut packet);
            let budget = self.policy.timeout_for(index);
            log::debug!(
                "Writing block {} at 0x{:06X} (budget {:?})",
                index,
                addr,
                budget
            );

            if !write_with_retry(transport, &packet, budget, self.policy.retry_delay) {
                return Err(Error::WriteTimeout { addr });
            }

            stats.blocks_written += 1;
            stats.bytes_sent += packet.len();
            progress.block_written(index, addr);
        }

        progress.complete(&stats);
        Ok(stats)
    }
}

/// Deliver `packet`, retrying until `budget` has elapsed
///
/// Each attempt is bounded by the time left in the budget, so the total
/// never exceeds it. Returns `false` once the budget is used up.
pub fn write_with_retry<T: HalfKayTransport + ?Sized>(
    transport: &mut T,
    packet: &[u8],
    budget: Duration,
    retry_delay: Duration,
) -> bool {
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        let remaining = budget.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            log::debug!("Write gave up after {} attempts", attempts);
            return false;
        }

        attempts += 1;
        match transport.write(packet, remaining) {
            Ok(()) => return true,
            Err(e) => log::trace!("Write attempt {} failed: {}", attempts, e),
        }

        let remaining = budget.saturating_sub(start.elapsed());
        thread::sleep(retry_delay.min(remaining));
    }
}

/// Tell the bootloader to start the application
///
/// The boot packet has the same length as the block packets.
pub fn boot<T: HalfKayTransport + ?Sized>(transport: &mut T, packet_len: usize) -> Result<()> {
    log::info!("Booting");
    let packet = boot_packet(packet_len);
    if write_with_retry(transport, &packet, BOOT_TIMEOUT, WritePolicy::default().retry_delay) {
        Ok(())
    } else {
        Err(Error::TransferFailed)
    }
}
