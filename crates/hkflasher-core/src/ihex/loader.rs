//! Whole-file HEX loading

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::record::{HexRecordParser, ParseOptions, RecordError};
use crate::image::MemoryImage;
use crate::mcu::McuGeometry;

/// Errors from loading a HEX file
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be opened
    #[error("Unable to open {}: {source}", .path.display())]
    Open {
        /// File that failed to open
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Reading from the input failed part way through
    #[error("Error reading HEX input: {0}")]
    Read(#[from] io::Error),

    /// A record was rejected
    #[error("HEX parse error on line {line}: {kind}")]
    Parse {
        /// One-based line number
        line: usize,
        /// What was wrong with the record
        kind: RecordError,
    },
}

/// A successfully parsed firmware image
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Sparse image of every data record
    pub image: MemoryImage,
    /// Number of data bytes accepted
    pub byte_count: usize,
    /// True if parsing stopped at an end-of-file record
    pub end_of_file_seen: bool,
}

/// Load a HEX file from disk
///
/// Every call builds a fresh image, so loading the same file twice yields
/// identical results.
pub fn load_file<P: AsRef<Path>>(
    path: P,
    geometry: McuGeometry,
    options: ParseOptions,
) -> Result<LoadedImage, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let loaded = load_reader(BufReader::new(file), geometry, options)?;
    log::debug!(
        "Parsed {}: {} data bytes, end record {}",
        path.display(),
        loaded.byte_count,
        if loaded.end_of_file_seen { "seen" } else { "missing" }
    );
    Ok(loaded)
}

/// Load HEX records from any buffered reader
///
/// Parsing stops at the first end-of-file record; anything after it is not
/// read. The first rejected record aborts the load.
pub fn load_reader<R: BufRead>(
    reader: R,
    geometry: McuGeometry,
    options: ParseOptions,
) -> Result<LoadedImage, LoadError> {
    let mut image = MemoryImage::new();
    let mut parser = HexRecordParser::new(geometry, options);

    for (index, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        let line = line.strip_suffix(b"\r").unwrap_or(&line);

        parser
            .parse_line(line, &mut image)
            .map_err(|kind| LoadError::Parse {
                line: index + 1,
                kind,
            })?;

        if parser.end_of_file_seen() {
            break;
        }
    }

    Ok(LoadedImage {
        image,
        byte_count: parser.total_bytes_loaded(),
        end_of_file_seen: parser.end_of_file_seen(),
    })
}
