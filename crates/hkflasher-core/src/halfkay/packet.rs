//! HalfKay packet layouts
//!
//! Every write to the bootloader is a single HID report holding a small
//! address header followed by one block of flash data. The header format
//! depends on how much flash the part has and how large its blocks are.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::image::MemoryImage;
use crate::mcu::McuGeometry;

/// Header length used by 512 and 1024 byte block parts
pub const WIDE_HEADER_LEN: usize = 64;

/// Header length used by 256 byte and smaller block parts
pub const SHORT_HEADER_LEN: usize = 2;

/// First bytes of the packet that tells the bootloader to run the application
pub const BOOT_MARKER: [u8; 3] = [0xFF, 0xFF, 0xFF];

/// Parts below this size address blocks with 16 bits
const SMALL_CODE_LIMIT: u32 = 0x10000;

/// Address header format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLayout {
    /// Little-endian 16-bit byte address (small AVR parts)
    Low16,
    /// Bits 8-23 of the address (256 byte pages on 128 KiB AVR parts)
    Page256,
    /// 24-bit little-endian address padded to a 64 byte header (ARM parts)
    Wide,
}

impl PacketLayout {
    /// Pick the layout for a device
    pub fn select(geometry: McuGeometry) -> Result<Self> {
        let McuGeometry {
            code_size,
            block_size,
        } = geometry;

        if code_size == 0 || block_size == 0 {
            Err(Error::InvalidGeometry)
        } else if block_size <= 256 && code_size < SMALL_CODE_LIMIT {
            Ok(Self::Low16)
        } else if block_size == 256 {
            Ok(Self::Page256)
        } else if block_size == 512 || block_size == 1024 {
            Ok(Self::Wide)
        } else {
            Err(Error::UnsupportedGeometry {
                code_size,
                block_size,
            })
        }
    }

    /// Bytes preceding the block data
    pub fn header_len(self) -> usize {
        match self {
            Self::Low16 | Self::Page256 => SHORT_HEADER_LEN,
            Self::Wide => WIDE_HEADER_LEN,
        }
    }

    /// Total packet size for blocks of `block_size` bytes
    pub fn packet_len(self, block_size: u32) -> usize {
        self.header_len() + block_size as usize
    }

    /// Write the address header into the start of `packet`
    ///
    /// `packet` must be at least [`header_len`](Self::header_len) bytes.
    pub fn encode_header(self, addr: u32, packet: &mut [u8]) {
        match self {
            Self::Low16 => {
                packet[0] = addr as u8;
                packet[1] = (addr >> 8) as u8;
            }
            Self::Page256 => {
                packet[0] = (addr >> 8) as u8;
                packet[1] = (addr >> 16) as u8;
            }
            Self::Wide => {
                packet[0] = addr as u8;
                packet[1] = (addr >> 8) as u8;
                packet[2] = (addr >> 16) as u8;
                packet[3..WIDE_HEADER_LEN].fill(0);
            }
        }
    }

    /// Recover the block address from a packet header
    pub fn decode_address(self, packet: &[u8]) -> u32 {
        match self {
            Self::Low16 => u16::from_le_bytes([packet[0], packet[1]]) as u32,
            Self::Page256 => ((packet[0] as u32) << 8) | ((packet[1] as u32) << 16),
            Self::Wide => u32::from_le_bytes([packet[0], packet[1], packet[2], 0]),
        }
    }

    /// Fill `packet` with the header and image data for the block at `addr`
    pub fn build(self, addr: u32, image: &MemoryImage, packet: &mut [u8]) {
        self.encode_header(addr, packet);
        image.read_into(addr, &mut packet[self.header_len()..]);
    }
}

/// Size of the boot packet for a device with `block_size` blocks
///
/// Matches the block packet size so the report length stays the same.
pub fn boot_packet_len(block_size: u32) -> usize {
    match block_size {
        512 | 1024 => block_size as usize + WIDE_HEADER_LEN,
        _ => block_size as usize + SHORT_HEADER_LEN,
    }
}

/// Zero-filled packet of `len` bytes starting with [`BOOT_MARKER`]
pub fn boot_packet(len: usize) -> Vec<u8> {
    let mut packet = vec![0u8; len.max(BOOT_MARKER.len())];
    packet[..BOOT_MARKER.len()].copy_from_slice(&BOOT_MARKER);
    packet
}

/// True if `packet` is a boot request rather than a block write
pub fn is_boot_packet(packet: &[u8]) -> bool {
    packet.starts_with(&BOOT_MARKER) && packet[BOOT_MARKER.len()..].iter().all(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(code_size: u32, block_size: u32) -> McuGeometry {
        McuGeometry {
            code_size,
            block_size,
        }
    }

    #[test]
    fn test_select_layout() {
        let low = PacketLayout::select(geometry(0x8000, 256)).unwrap();
        assert_eq!(low, PacketLayout::Low16);
        assert_eq!(low.packet_len(256), 258);

        let wide = PacketLayout::select(geometry(1048576, 1024)).unwrap();
        assert_eq!(wide, PacketLayout::Wide);
        assert_eq!(wide.packet_len(1024), 1088);

        assert_eq!(
            PacketLayout::select(geometry(130048, 256)).unwrap(),
            PacketLayout::Page256
        );
        assert_eq!(
            PacketLayout::select(geometry(32256, 128)).unwrap(),
            PacketLayout::Low16
        );
        // 512 byte blocks use the wide header even on a small part
        assert_eq!(
            PacketLayout::select(geometry(63488, 512)).unwrap(),
            PacketLayout::Wide
        );
    }

    #[test]
    fn test_select_rejects_unknown() {
        assert_eq!(
            PacketLayout::select(geometry(0x20000, 128)),
            Err(Error::UnsupportedGeometry {
                code_size: 0x20000,
                block_size: 128
            })
        );
        assert!(PacketLayout::select(geometry(0x100000, 2048)).is_err());
        assert_eq!(
            PacketLayout::select(geometry(0, 1024)),
            Err(Error::InvalidGeometry)
        );
    }

    #[test]
    fn test_headers() {
        let mut packet = [0xAAu8; 64];

        PacketLayout::Low16.encode_header(0x1280, &mut packet);
        assert_eq!(packet[..2], [0x80, 0x12]);

        PacketLayout::Page256.encode_header(0x01_2300, &mut packet);
        assert_eq!(packet[..2], [0x23, 0x01]);

        PacketLayout::Wide.encode_header(0x1F_0400, &mut packet);
        assert_eq!(packet[..3], [0x00, 0x04, 0x1F]);
        assert!(packet[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_address() {
        let mut packet = [0u8; 64];
        for (layout, addr) in [
            (PacketLayout::Low16, 0x7F80),
            (PacketLayout::Page256, 0x01_FE00),
            (PacketLayout::Wide, 0xF7_FC00),
        ] {
            layout.encode_header(addr, &mut packet);
            assert_eq!(layout.decode_address(&packet), addr);
        }
    }

    #[test]
    fn test_build_packet() {
        let mut image = MemoryImage::new();
        image.set(0x400, 0x11).unwrap();
        image.set(0x402, 0x33).unwrap();

        let mut packet = vec![0u8; PacketLayout::Wide.packet_len(1024)];
        PacketLayout::Wide.build(0x400, &image, &mut packet);

        assert_eq!(packet[..3], [0x00, 0x04, 0x00]);
        assert_eq!(packet[64..68], [0x11, 0xFF, 0x33, 0xFF]);
        assert!(packet[68..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_boot_packet() {
        assert_eq!(boot_packet_len(1024), 1088);
        assert_eq!(boot_packet_len(512), 576);
        assert_eq!(boot_packet_len(256), 258);
        assert_eq!(boot_packet_len(128), 130);

        let packet = boot_packet(130);
        assert_eq!(packet.len(), 130);
        assert_eq!(packet[..3], BOOT_MARKER);
        assert!(is_boot_packet(&packet));

        let mut block = vec![0u8; 130];
        PacketLayout::Low16.encode_header(0x100, &mut block);
        assert!(!is_boot_packet(&block));
    }
}
