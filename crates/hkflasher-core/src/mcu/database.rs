//! MCU table with runtime additions
//!
//! This module provides the `McuDatabase` type, which starts from the
//! built-in table and can be extended with boards described in RON files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{McuGeometry, MCUS};

/// Errors from loading MCU definitions
#[derive(Debug, Error)]
pub enum McuDbError {
    /// The table file could not be read
    #[error("Unable to read MCU table {}: {source}", .path.display())]
    Read {
        /// File that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The text is not a valid RON MCU table
    #[error("Malformed MCU table: {0}")]
    Syntax(#[from] ron::error::SpannedError),

    /// An entry parsed but describes an unusable geometry
    #[error("MCU {name}: {reason}")]
    InvalidEntry {
        /// Entry name as written in the table
        name: String,
        /// What is wrong with it
        reason: String,
    },
}

/// Memory size as written in a table file: `B(n)`, `KiB(n)` or `MiB(n)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub enum Size {
    /// Plain bytes
    B(u32),
    /// Multiples of 1024 bytes
    KiB(u32),
    /// Multiples of 1024 * 1024 bytes
    MiB(u32),
}

impl Size {
    /// Byte count, or `None` if it does not fit the 32-bit address space
    pub fn bytes(self) -> Option<u32> {
        match self {
            Size::B(n) => Some(n),
            Size::KiB(n) => n.checked_mul(1 << 10),
            Size::MiB(n) => n.checked_mul(1 << 20),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct McuDef {
    name: String,
    code_size: Size,
    block_size: Size,
}

#[derive(Debug, serde::Deserialize)]
struct McuFile {
    mcus: Vec<McuDef>,
}

// ============================================================================
// Runtime table
// ============================================================================

/// A named geometry owned by the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McuEntry {
    /// MCU or board name
    pub name: String,
    /// Memory layout
    pub geometry: McuGeometry,
}

/// Built-in MCUs plus any loaded from files
#[derive(Debug, Clone)]
pub struct McuDatabase {
    entries: Vec<McuEntry>,
}

impl Default for McuDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl McuDatabase {
    /// Create a database holding the built-in table
    pub fn new() -> Self {
        let entries = MCUS
            .iter()
            .map(|m| McuEntry {
                name: m.name.to_string(),
                geometry: m.geometry,
            })
            .collect();
        Self { entries }
    }

    /// Number of known MCUs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the database has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in table order
    pub fn iter(&self) -> impl Iterator<Item = &McuEntry> {
        self.entries.iter()
    }

    /// Look up an MCU by name, ignoring ASCII case
    pub fn find(&self, name: &str) -> Option<&McuEntry> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Add MCUs from RON text, returning how many were added
    ///
    /// An entry whose name already exists replaces the existing geometry.
    pub fn load_ron(&mut self, text: &str) -> Result<usize, McuDbError> {
        let file: McuFile = ron::from_str(text)?;
        let mut count = 0;

        for def in file.mcus {
            let invalid = |reason: String| McuDbError::InvalidEntry {
                name: def.name.clone(),
                reason,
            };
            let sizes = (def.code_size.bytes(), def.block_size.bytes());
            let (Some(code_size), Some(block_size)) = sizes else {
                return Err(invalid("size overflows u32".into()));
            };
            let geometry =
                McuGeometry::new(code_size, block_size).map_err(|e| invalid(e.to_string()))?;

            match self
                .entries
                .iter_mut()
                .find(|e| e.name.eq_ignore_ascii_case(&def.name))
            {
                Some(existing) => {
                    log::debug!("Overriding MCU {}", existing.name);
                    existing.geometry = geometry;
                }
                None => self.entries.push(McuEntry {
                    name: def.name,
                    geometry,
                }),
            }
            count += 1;
        }

        Ok(count)
    }

    /// Add MCUs from a RON file
    pub fn load_file(&mut self, path: &Path) -> Result<usize, McuDbError> {
        let text = fs::read_to_string(path).map_err(|source| McuDbError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let count = self.load_ron(&text)?;
        log::debug!("Loaded {} MCU definitions from {}", count, path.display());
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_entries() {
        let db = McuDatabase::new();
        assert_eq!(db.len(), MCUS.len());
        assert_eq!(db.find("Teensy41").unwrap().geometry.code_size, 8126464);
    }

    #[test]
    fn test_load_ron() {
        let ron = r#"
        (
            mcus: [
                (name: "custom_board", code_size: KiB(256), block_size: B(1024)),
                (name: "teensylc", code_size: B(63488), block_size: B(512)),
            ],
        )
        "#;

        let mut db = McuDatabase::new();
        let count = db.load_ron(ron).unwrap();

        assert_eq!(count, 2);
        // The second entry replaced an existing one
        assert_eq!(db.len(), MCUS.len() + 1);

        let entry = db.find("CUSTOM_BOARD").unwrap();
        assert_eq!(entry.geometry.code_size, 262144);
        assert_eq!(entry.geometry.block_size, 1024);
    }

    #[test]
    fn test_load_ron_rejects_zero() {
        let ron = r#"(mcus: [(name: "broken", code_size: B(0), block_size: B(128))])"#;

        let mut db = McuDatabase::new();
        assert!(matches!(
            db.load_ron(ron),
            Err(McuDbError::InvalidEntry { ref name, .. }) if name == "broken"
        ));
    }

    #[test]
    fn test_size_conversion() {
        assert_eq!(Size::B(512).bytes(), Some(512));
        assert_eq!(Size::KiB(62).bytes(), Some(63488));
        assert_eq!(Size::MiB(1).bytes(), Some(1048576));
        assert_eq!(Size::MiB(4096).bytes(), None);
        assert_eq!(Size::KiB(u32::MAX).bytes(), None);
    }

    #[test]
    fn test_load_ron_rejects_oversized() {
        let ron = r#"(mcus: [(name: "big", code_size: MiB(4097), block_size: B(1024))])"#;

        let mut db = McuDatabase::new();
        match db.load_ron(ron) {
            Err(McuDbError::InvalidEntry { name, reason }) => {
                assert_eq!(name, "big");
                assert!(reason.contains("overflow"));
            }
            other => panic!("expected invalid entry, got {:?}", other),
        }
        assert!(db.find("big").is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("hkflasher-no-such-mcu-table.ron");
        let err = McuDatabase::new().load_file(&path).unwrap_err();
        assert!(matches!(err, McuDbError::Read { .. }));
        assert!(err.to_string().contains("hkflasher-no-such-mcu-table.ron"));
    }
}
