//! Intel HEX input
//!
//! - [`HexRecordParser`] decodes single records into a [`MemoryImage`](crate::image::MemoryImage)
//! - [`load_file`] / [`load_reader`] drive the parser over a whole file

#[cfg(feature = "std")]
mod loader;
mod record;

#[cfg(feature = "std")]
pub use loader::{load_file, load_reader, LoadError, LoadedImage};
pub use record::{
    rebase_flexspi, HexRecordParser, LineOutcome, ParseOptions, RecordError, RecordType,
    FLEXSPI_BASE, MIN_RECORD_LEN, START_CODE,
};
