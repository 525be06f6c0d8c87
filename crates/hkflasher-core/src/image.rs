//! Sparse firmware memory image
//!
//! A [`MemoryImage`] covers a bounded address space and remembers which
//! addresses were actually defined by the hex file. Storage is allocated in
//! fixed-size chunks on first write, so a small AVR image does not pay for
//! the full 16 MiB address space.
//!
//! Any address that was never written reads as [`ERASED_VALUE`].

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};

/// The erased value for flash memory (all bits set)
pub const ERASED_VALUE: u8 = 0xFF;

/// Largest image that can be loaded (16 MiB)
pub const MAX_IMAGE_SIZE: u32 = 0x100_0000;

const CHUNK_SIZE: usize = 1024;
const MASK_WORDS: usize = CHUNK_SIZE / 64;

/// One allocated chunk of the image with its presence bitmap
#[derive(Debug, Clone)]
struct Chunk {
    data: Box<[u8; CHUNK_SIZE]>,
    present: [u64; MASK_WORDS],
}

impl Chunk {
    fn new() -> Self {
        Self {
            data: Box::new([ERASED_VALUE; CHUNK_SIZE]),
            present: [0; MASK_WORDS],
        }
    }

    fn get(&self, offset: usize) -> Option<u8> {
        if self.present[offset / 64] & (1 << (offset % 64)) != 0 {
            Some(self.data[offset])
        } else {
            None
        }
    }

    fn set(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
        self.present[offset / 64] |= 1 << (offset % 64);
    }
}

/// Sparse byte store over `[0, capacity)`
#[derive(Debug, Clone)]
pub struct MemoryImage {
    capacity: u32,
    chunks: BTreeMap<u32, Chunk>,
}

impl Default for MemoryImage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryImage {
    /// Create an empty image spanning [`MAX_IMAGE_SIZE`] bytes
    pub fn new() -> Self {
        Self::with_capacity(MAX_IMAGE_SIZE)
    }

    /// Create an empty image spanning `capacity` bytes
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            capacity,
            chunks: BTreeMap::new(),
        }
    }

    /// Number of addressable bytes
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Forget all defined bytes; every address reads as erased again
    pub fn reset(&mut self) {
        self.chunks.clear();
    }

    /// True if no address holds defined data
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Count of addresses holding defined data
    pub fn defined_len(&self) -> usize {
        self.chunks
            .values()
            .map(|c| c.present.iter().map(|w| w.count_ones() as usize).sum::<usize>())
            .sum()
    }

    /// Store `value` at `addr` and mark it defined
    pub fn set(&mut self, addr: u32, value: u8) -> Result<()> {
        if addr >= self.capacity {
            return Err(Error::AddressOutOfRange { addr: addr as u64 });
        }
        let index = addr / CHUNK_SIZE as u32;
        let offset = addr as usize % CHUNK_SIZE;
        self.chunks
            .entry(index)
            .or_insert_with(Chunk::new)
            .set(offset, value);
        Ok(())
    }

    /// Effective value at `addr` (erased if undefined or out of range)
    pub fn get(&self, addr: u32) -> u8 {
        self.defined(addr).unwrap_or(ERASED_VALUE)
    }

    /// Defined value at `addr`, if any
    pub fn defined(&self, addr: u32) -> Option<u8> {
        if addr >= self.capacity {
            return None;
        }
        self.chunks
            .get(&(addr / CHUNK_SIZE as u32))
            .and_then(|c| c.get(addr as usize % CHUNK_SIZE))
    }

    /// Fill `buf` with the effective bytes starting at `addr`
    ///
    /// A range running past the end of the image yields an all-erased buffer
    /// rather than an error.
    pub fn read_into(&self, addr: u32, buf: &mut [u8]) {
        buf.fill(ERASED_VALUE);
        if addr as u64 + buf.len() as u64 > self.capacity as u64 {
            return;
        }
        for (a, value) in self.defined_in(addr as u64, addr as u64 + buf.len() as u64) {
            buf[(a - addr) as usize] = value;
        }
    }

    /// Effective bytes of `[addr, addr + len)`
    pub fn read_range(&self, addr: u32, len: usize) -> Vec<u8> {
        let mut buf = vec![ERASED_VALUE; len];
        self.read_into(addr, &mut buf);
        buf
    }

    /// True if any address in the inclusive range `[begin, end]` is defined
    ///
    /// Bounds outside the image yield `false`.
    pub fn has_any_data(&self, begin: u32, end: u32) -> bool {
        if begin >= self.capacity || end >= self.capacity {
            return false;
        }
        self.defined_in(begin as u64, end as u64 + 1).next().is_some()
    }

    /// True if every defined byte in `[addr, addr + len)` equals [`ERASED_VALUE`]
    ///
    /// Undefined bytes count as blank. A start beyond the image is blank.
    pub fn is_blank(&self, addr: u32, len: usize) -> bool {
        if addr > self.capacity {
            return true;
        }
        let end = (addr as u64 + len as u64).min(self.capacity as u64);
        self.defined_in(addr as u64, end)
            .all(|(_, value)| value == ERASED_VALUE)
    }

    /// Iterate defined `(address, value)` pairs in `[start, end)`
    fn defined_in(&self, start: u64, end: u64) -> impl Iterator<Item = (u32, u8)> + '_ {
        let chunk = CHUNK_SIZE as u64;
        let first = (start / chunk) as u32;
        let last = (end.saturating_sub(1) / chunk) as u32;
        let chunks = if start < end {
            Some(self.chunks.range(first..=last))
        } else {
            None
        };
        chunks.into_iter().flatten().flat_map(move |(&index, c)| {
            let base = index as u64 * chunk;
            let lo = start.max(base) - base;
            let hi = end.min(base + chunk) - base;
            (lo..hi).filter_map(move |off| {
                c.get(off as usize)
                    .map(|value| ((base + off) as u32, value))
            })
        })
    }
}
