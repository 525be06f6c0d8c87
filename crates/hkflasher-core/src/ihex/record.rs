//! Line-oriented Intel HEX record parser
//!
//! [`HexRecordParser`] consumes one record at a time and applies it to a
//! [`MemoryImage`]. It carries the extended address between records and
//! knows about the FlexSPI rebase used by large i.MX RT flash images.

use core::fmt;

use crate::image::MemoryImage;
use crate::mcu::McuGeometry;

/// Every record starts with this byte
pub const START_CODE: u8 = b':';

/// Shortest well-formed record: `:` + count + address + type + checksum
pub const MIN_RECORD_LEN: usize = 11;

/// Execute-in-place base of FlexSPI flash on i.MX RT parts
pub const FLEXSPI_BASE: u32 = 0x6000_0000;

/// Rebase only applies to parts with more than this much flash
const FLEXSPI_MIN_CODE_SIZE: u32 = 1024 * 1024;
/// Rebase only applies to parts with at least this block size
const FLEXSPI_MIN_BLOCK_SIZE: u32 = 1024;

/// Intel HEX record type field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// `00` - data bytes
    Data,
    /// `01` - end of file
    EndOfFile,
    /// `02` - extended segment address (bits 4-19)
    ExtendedSegmentAddress,
    /// `04` - extended linear address (bits 16-31)
    ExtendedLinearAddress,
    /// Any other type; accepted and ignored
    Other(u8),
}

impl From<u8> for RecordType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Data,
            0x01 => Self::EndOfFile,
            0x02 => Self::ExtendedSegmentAddress,
            0x04 => Self::ExtendedLinearAddress,
            other => Self::Other(other),
        }
    }
}

/// Reasons a record is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    /// Line does not begin with ':'
    MissingStartCode,
    /// Line is shorter than the smallest valid record
    RecordTooShort(usize),
    /// Line is shorter than its byte count requires
    RecordTruncated {
        /// Declared data byte count
        declared: u8,
        /// Actual line length in characters
        len: usize,
    },
    /// Non-hexadecimal character where a hex byte was expected
    InvalidHexDigit {
        /// Zero-based column of the offending byte
        column: usize,
    },
    /// Data record checksum does not cancel the byte sum
    ChecksumMismatch {
        /// Low byte of the computed sum
        sum: u8,
        /// Trailing checksum byte found in the record
        checksum: u8,
    },
    /// Extended address record checksum mismatch (strict mode only)
    ExtendedChecksumMismatch {
        /// Low byte of the computed sum
        sum: u8,
        /// Trailing checksum byte found in the record
        checksum: u8,
    },
    /// Data lands outside the memory image
    AddressOutOfRange {
        /// First absolute address that does not fit
        addr: u64,
    },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStartCode => write!(f, "missing start code ':'"),
            Self::RecordTooShort(len) => write!(
                f,
                "record too short ({} characters, need at least {})",
                len, MIN_RECORD_LEN
            ),
            Self::RecordTruncated { declared, len } => write!(
                f,
                "record declares {} data bytes but is only {} characters long",
                declared, len
            ),
            Self::InvalidHexDigit { column } => {
                write!(f, "invalid hex digit at column {}", column + 1)
            }
            Self::ChecksumMismatch { sum, checksum } => write!(
                f,
                "checksum error (sum 0x{:02X}, checksum byte 0x{:02X})",
                sum, checksum
            ),
            Self::ExtendedChecksumMismatch { sum, checksum } => write!(
                f,
                "extended address checksum error (sum 0x{:02X}, checksum byte 0x{:02X})",
                sum, checksum
            ),
            Self::AddressOutOfRange { addr } => {
                write!(f, "address 0x{:08X} beyond the memory image", addr)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RecordError {}

/// Parser behaviour switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Reject extended address records with a bad checksum instead of
    /// ignoring them
    pub strict_extended_checksum: bool,
}

/// Effect of a single accepted line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// Data bytes were stored
    Data {
        /// Absolute address of the first byte
        addr: u32,
        /// Number of bytes stored
        len: usize,
    },
    /// End-of-file record
    EndOfFile,
    /// Extended address updated
    ExtendedAddress(u32),
    /// Well-formed line with no effect
    Ignored,
}

/// Stateful per-line record decoder
#[derive(Debug, Clone)]
pub struct HexRecordParser {
    geometry: McuGeometry,
    options: ParseOptions,
    extended_address: u32,
    end_of_file_seen: bool,
    total_bytes_loaded: usize,
}

impl HexRecordParser {
    /// Create a parser for a device with the given geometry
    pub fn new(geometry: McuGeometry, options: ParseOptions) -> Self {
        Self {
            geometry,
            options,
            extended_address: 0,
            end_of_file_seen: false,
            total_bytes_loaded: 0,
        }
    }

    /// Upper address bits from the most recent extended address record
    pub fn extended_address(&self) -> u32 {
        self.extended_address
    }

    /// True once an end-of-file record was accepted
    pub fn end_of_file_seen(&self) -> bool {
        self.end_of_file_seen
    }

    /// Data bytes accepted so far
    pub fn total_bytes_loaded(&self) -> usize {
        self.total_bytes_loaded
    }

    /// Decode one line (without line terminator) into `image`
    pub fn parse_line(
        &mut self,
        line: &[u8],
        image: &mut MemoryImage,
    ) -> Result<LineOutcome, RecordError> {
        if line.first() != Some(&START_CODE) {
            return Err(RecordError::MissingStartCode);
        }
        if line.len() < MIN_RECORD_LEN {
            return Err(RecordError::RecordTooShort(line.len()));
        }

        let count = hex_byte(line, 1)?;
        if line.len() < MIN_RECORD_LEN + count as usize * 2 {
            return Err(RecordError::RecordTruncated {
                declared: count,
                len: line.len(),
            });
        }
        let addr_hi = hex_byte(line, 3)?;
        let addr_lo = hex_byte(line, 5)?;
        let rtype = hex_byte(line, 7)?;
        let address = u16::from_be_bytes([addr_hi, addr_lo]);

        let header_sum = count
            .wrapping_add(addr_hi)
            .wrapping_add(addr_lo)
            .wrapping_add(rtype);

        match RecordType::from(rtype) {
            RecordType::Data => self.parse_data(line, count, address, header_sum, image),
            RecordType::EndOfFile => {
                self.end_of_file_seen = true;
                Ok(LineOutcome::EndOfFile)
            }
            RecordType::ExtendedSegmentAddress if count == 2 => {
                self.parse_extended(line, header_sum, |v| v << 4)
            }
            RecordType::ExtendedLinearAddress if count == 2 => {
                let geometry = self.geometry;
                self.parse_extended(line, header_sum, |v| {
                    rebase_flexspi(v << 16, geometry)
                })
            }
            _ => Ok(LineOutcome::Ignored),
        }
    }

    fn parse_data(
        &mut self,
        line: &[u8],
        count: u8,
        address: u16,
        header_sum: u8,
        image: &mut MemoryImage,
    ) -> Result<LineOutcome, RecordError> {
        let mut data = [0u8; 255];
        let data = &mut data[..count as usize];
        let mut sum = header_sum;
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = hex_byte(line, 9 + i * 2)?;
            sum = sum.wrapping_add(*byte);
        }
        let checksum = hex_byte(line, 9 + count as usize * 2)?;
        if sum.wrapping_add(checksum) != 0 {
            return Err(RecordError::ChecksumMismatch { sum, checksum });
        }

        let base = address as u64 + self.extended_address as u64;
        let end = base + count as u64;
        if end > image.capacity() as u64 {
            return Err(RecordError::AddressOutOfRange {
                addr: base.max(image.capacity() as u64),
            });
        }
        for (offset, byte) in data.iter().enumerate() {
            let addr = base + offset as u64;
            image
                .set(addr as u32, *byte)
                .map_err(|_| RecordError::AddressOutOfRange { addr })?;
        }

        self.total_bytes_loaded += count as usize;
        Ok(LineOutcome::Data {
            addr: base as u32,
            len: count as usize,
        })
    }

    /// Shared body of the type 02 and 04 records
    ///
    /// Undecodable or checksum-failing records leave the extended address
    /// untouched unless strict mode is on.
    fn parse_extended(
        &mut self,
        line: &[u8],
        header_sum: u8,
        to_address: impl FnOnce(u32) -> u32,
    ) -> Result<LineOutcome, RecordError> {
        let (Ok(hi), Ok(lo), Ok(checksum)) =
            (hex_byte(line, 9), hex_byte(line, 11), hex_byte(line, 13))
        else {
            return Ok(LineOutcome::Ignored);
        };

        let sum = header_sum.wrapping_add(hi).wrapping_add(lo);
        if sum.wrapping_add(checksum) != 0 {
            if self.options.strict_extended_checksum {
                return Err(RecordError::ExtendedChecksumMismatch { sum, checksum });
            }
            log::warn!(
                "Ignoring extended address record with bad checksum (sum 0x{:02X}, checksum 0x{:02X})",
                sum,
                checksum
            );
            return Ok(LineOutcome::Ignored);
        }

        self.extended_address = to_address(u16::from_be_bytes([hi, lo]) as u32);
        log::trace!("Extended address = 0x{:08X}", self.extended_address);
        Ok(LineOutcome::ExtendedAddress(self.extended_address))
    }
}

/// Strip the FlexSPI execute-in-place base from an extended linear address
///
/// Only large-flash devices with 1 KiB blocks (i.MX RT based Teensy boards)
/// link their images at [`FLEXSPI_BASE`].
pub fn rebase_flexspi(extended_address: u32, geometry: McuGeometry) -> u32 {
    let window_end = FLEXSPI_BASE as u64 + geometry.code_size as u64;
    if geometry.code_size > FLEXSPI_MIN_CODE_SIZE
        && geometry.block_size >= FLEXSPI_MIN_BLOCK_SIZE
        && extended_address >= FLEXSPI_BASE
        && (extended_address as u64) < window_end
    {
        extended_address - FLEXSPI_BASE
    } else {
        extended_address
    }
}

/// Decode the two hex digits at `pos`
fn hex_byte(line: &[u8], pos: usize) -> Result<u8, RecordError> {
    let digit = |column: usize| -> Result<u8, RecordError> {
        line.get(column)
            .and_then(|c| (*c as char).to_digit(16))
            .map(|d| d as u8)
            .ok_or(RecordError::InvalidHexDigit { column })
    };
    Ok((digit(pos)? << 4) | digit(pos + 1)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: McuGeometry = McuGeometry {
        code_size: 32256,
        block_size: 128,
    };
    const TEENSY40: McuGeometry = McuGeometry {
        code_size: 2031616,
        block_size: 1024,
    };
    const TEENSY36: McuGeometry = McuGeometry {
        code_size: 1048576,
        block_size: 1024,
    };

    fn parse(parser: &mut HexRecordParser, image: &mut MemoryImage, line: &str) -> LineOutcome {
        parser.parse_line(line.as_bytes(), image).unwrap()
    }

    #[test]
    fn test_data_record() {
        let mut parser = HexRecordParser::new(SMALL, ParseOptions::default());
        let mut image = MemoryImage::new();

        let outcome = parse(&mut parser, &mut image, ":0400100001020304E2");
        assert_eq!(outcome, LineOutcome::Data { addr: 0x10, len: 4 });
        assert_eq!(image.read_range(0x10, 4), [1, 2, 3, 4]);
        assert_eq!(parser.total_bytes_loaded(), 4);
    }

    #[test]
    fn test_lowercase_hex() {
        let mut parser = HexRecordParser::new(SMALL, ParseOptions::default());
        let mut image = MemoryImage::new();

        parse(&mut parser, &mut image, ":02000000abcd86");
        assert_eq!(image.read_range(0, 2), [0xAB, 0xCD]);
    }

    #[test]
    fn test_framing_errors() {
        let mut parser = HexRecordParser::new(SMALL, ParseOptions::default());
        let mut image = MemoryImage::new();

        assert_eq!(
            parser.parse_line(b"0400100001020304E2", &mut image),
            Err(RecordError::MissingStartCode)
        );
        assert_eq!(
            parser.parse_line(b":00000001F", &mut image),
            Err(RecordError::RecordTooShort(10))
        );
        assert_eq!(
            parser.parse_line(b":0400100001020304", &mut image),
            Err(RecordError::RecordTruncated {
                declared: 4,
                len: 17
            })
        );
        assert_eq!(
            parser.parse_line(b":04001000010G0304E2", &mut image),
            Err(RecordError::InvalidHexDigit { column: 12 })
        );
    }

    #[test]
    fn test_data_checksum_mismatch() {
        let mut parser = HexRecordParser::new(SMALL, ParseOptions::default());
        let mut image = MemoryImage::new();

        let err = parser
            .parse_line(b":0400100001020305E2", &mut image)
            .unwrap_err();
        assert!(matches!(err, RecordError::ChecksumMismatch { .. }));
        assert!(image.is_empty());
    }

    #[test]
    fn test_end_of_file() {
        let mut parser = HexRecordParser::new(SMALL, ParseOptions::default());
        let mut image = MemoryImage::new();

        // Checksum is not inspected for the end record
        assert_eq!(
            parse(&mut parser, &mut image, ":00000001FE"),
            LineOutcome::EndOfFile
        );
        assert!(parser.end_of_file_seen());
    }

    #[test]
    fn test_unknown_record_ignored() {
        let mut parser = HexRecordParser::new(SMALL, ParseOptions::default());
        let mut image = MemoryImage::new();

        assert_eq!(
            parse(&mut parser, &mut image, ":0400000500000000F7"),
            LineOutcome::Ignored
        );
        assert_eq!(parser.extended_address(), 0);
    }

    #[test]
    fn test_extended_segment_address() {
        let mut parser = HexRecordParser::new(TEENSY36, ParseOptions::default());
        let mut image = MemoryImage::new();

        assert_eq!(
            parse(&mut parser, &mut image, ":020000021000EC"),
            LineOutcome::ExtendedAddress(0x10000)
        );
        parse(&mut parser, &mut image, ":0100040055A6");
        parse(&mut parser, &mut image, ":010005006694");
        assert_eq!(image.get(0x10004), 0x55);
        assert_eq!(image.get(0x10005), 0x66);
    }

    #[test]
    fn test_extended_linear_address() {
        let mut parser = HexRecordParser::new(TEENSY36, ParseOptions::default());
        let mut image = MemoryImage::new();

        parse(&mut parser, &mut image, ":020000040001F9");
        assert_eq!(parser.extended_address(), 0x10000);
        parse(&mut parser, &mut image, ":0100000042BD");
        assert_eq!(image.get(0x10000), 0x42);
    }

    #[test]
    fn test_extended_checksum_ignored() {
        let mut parser = HexRecordParser::new(TEENSY36, ParseOptions::default());
        let mut image = MemoryImage::new();

        parse(&mut parser, &mut image, ":020000040001F9");
        assert_eq!(
            parse(&mut parser, &mut image, ":020000040002F9"),
            LineOutcome::Ignored
        );
        assert_eq!(parser.extended_address(), 0x10000);
    }

    #[test]
    fn test_extended_checksum_strict() {
        let options = ParseOptions {
            strict_extended_checksum: true,
        };
        let mut parser = HexRecordParser::new(TEENSY36, options);
        let mut image = MemoryImage::new();

        let err = parser
            .parse_line(b":020000040002F9", &mut image)
            .unwrap_err();
        assert!(matches!(err, RecordError::ExtendedChecksumMismatch { .. }));
    }

    #[test]
    fn test_extended_wrong_length_ignored() {
        let mut parser = HexRecordParser::new(TEENSY36, ParseOptions::default());
        let mut image = MemoryImage::new();

        assert_eq!(
            parse(&mut parser, &mut image, ":0100000401FA"),
            LineOutcome::Ignored
        );
        assert_eq!(parser.extended_address(), 0);
    }

    #[test]
    fn test_flexspi_rebase() {
        let mut parser = HexRecordParser::new(TEENSY40, ParseOptions::default());
        let mut image = MemoryImage::new();

        assert_eq!(
            parser.parse_line(b":020000046000", &mut image),
            Err(RecordError::RecordTruncated {
                declared: 2,
                len: 13
            })
        );
        assert_eq!(
            parse(&mut parser, &mut image, ":020000046000 9A"),
            LineOutcome::Ignored
        );
        assert_eq!(
            parse(&mut parser, &mut image, ":0200000460009A"),
            LineOutcome::ExtendedAddress(0)
        );
        parse(&mut parser, &mut image, ":0110000042AD");
        assert_eq!(image.get(0x1000), 0x42);
    }

    #[test]
    fn test_rebase_conditions() {
        assert_eq!(rebase_flexspi(0x6000_1000, TEENSY40), 0x1000);
        assert_eq!(rebase_flexspi(0x6000_0000, TEENSY40), 0);
        // Too little flash
        let small_flash = McuGeometry {
            code_size: 131072,
            block_size: 1024,
        };
        assert_eq!(rebase_flexspi(0x6000_1000, small_flash), 0x6000_1000);
        // Exactly 1 MiB is not enough
        assert_eq!(rebase_flexspi(0x6000_1000, TEENSY36), 0x6000_1000);
        // Small blocks
        let small_blocks = McuGeometry {
            code_size: 2031616,
            block_size: 512,
        };
        assert_eq!(rebase_flexspi(0x6000_1000, small_blocks), 0x6000_1000);
        // Outside the FlexSPI window
        assert_eq!(rebase_flexspi(0x6000_0000 + 2031616, TEENSY40), 0x6000_0000 + 2031616);
        assert_eq!(rebase_flexspi(0x5FFF_0000, TEENSY40), 0x5FFF_0000);
    }

    #[test]
    fn test_data_out_of_range() {
        let mut parser = HexRecordParser::new(TEENSY36, ParseOptions::default());
        let mut image = MemoryImage::new();

        // Extended linear address 0x0100_0000 is the first byte past 16 MiB
        parse(&mut parser, &mut image, ":020000040100F9");
        let err = parser.parse_line(b":0100000042BD", &mut image).unwrap_err();
        assert_eq!(err, RecordError::AddressOutOfRange { addr: 0x0100_0000 });
    }

    #[test]
    fn test_extended_address_persists() {
        let mut parser = HexRecordParser::new(TEENSY36, ParseOptions::default());
        let mut image = MemoryImage::new();

        parse(&mut parser, &mut image, ":020000040001F9");
        parse(&mut parser, &mut image, ":0100000042BD");
        parse(&mut parser, &mut image, ":0100010043BB");
        assert_eq!(parser.extended_address(), 0x10000);
        assert_eq!(image.read_range(0x10000, 2), [0x42, 0x43]);
    }
}
