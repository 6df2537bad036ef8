//! Table file naming: file number to on-disk name, and back.
//!
//! Grounded in the teacher's `LevelDBFileName` (`database_files.rs`), cut
//! down to the two table-file variants this crate's cache actually opens —
//! the `.ldb` extension current LevelDB writes, and the legacy `.sst`
//! extension older databases may still have on disk. Everything else in the
//! teacher's enum (WAL segments, MANIFEST, CURRENT, LOCK, info logs) belongs
//! to the write path and database-directory management this crate has no
//! part of.
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFileName {
    /// The current table file extension.
    Table { file_number: u64 },
    /// The legacy extension older databases may still carry.
    TableLegacyExtension { file_number: u64 },
}

impl TableFileName {
    #[must_use]
    pub fn parse(file_name: &Path) -> Option<Self> {
        let file_name = file_name.to_str()?;
        let &first_byte = file_name.as_bytes().first()?;
        if first_byte == b'+' {
            return None;
        }

        if let Some(digits) = file_name.strip_suffix(".ldb") {
            Some(Self::Table { file_number: digits.parse().ok()? })
        } else if let Some(digits) = file_name.strip_suffix(".sst") {
            Some(Self::TableLegacyExtension { file_number: digits.parse().ok()? })
        } else {
            None
        }
    }

    #[must_use]
    pub fn file_number(self) -> u64 {
        match self {
            Self::Table { file_number } | Self::TableLegacyExtension { file_number } => file_number,
        }
    }

    #[must_use]
    pub fn file_name(self) -> PathBuf {
        match self {
            Self::Table { file_number } => format!("{file_number:06}.ldb").into(),
            Self::TableLegacyExtension { file_number } => format!("{file_number:06}.sst").into(),
        }
    }
}

/// Resolves `file_number` to a path within `db_directory`, preferring the
/// current `.ldb` extension and falling back to the legacy `.sst` name if
/// that's the one present on disk.
#[must_use]
pub fn table_file_candidates(db_directory: &Path, file_number: u64) -> [PathBuf; 2] {
    [
        db_directory.join(TableFileName::Table { file_number }.file_name()),
        db_directory.join(TableFileName::TableLegacyExtension { file_number }.file_name()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ldb_and_sst_extensions() {
        assert_eq!(
            TableFileName::parse(Path::new("000123.ldb")),
            Some(TableFileName::Table { file_number: 123 }),
        );
        assert_eq!(
            TableFileName::parse(Path::new("000123.sst")),
            Some(TableFileName::TableLegacyExtension { file_number: 123 }),
        );
    }

    #[test]
    fn rejects_non_table_names() {
        assert_eq!(TableFileName::parse(Path::new("CURRENT")), None);
        assert_eq!(TableFileName::parse(Path::new("000123.log")), None);
        assert_eq!(TableFileName::parse(Path::new("+123.ldb")), None);
    }

    #[test]
    fn file_name_round_trips() {
        let name = TableFileName::Table { file_number: 42 };
        assert_eq!(TableFileName::parse(&name.file_name()), Some(name));
    }
}
