//! A [`TableSource`] backed by the real filesystem: resolves a file number
//! to a path under a database directory, preferring the current `.ldb`
//! extension and retrying the legacy `.sst` name on failure.
//!
//! Grounded in §4.1's open policy and the teacher's `anchored-vfs`
//! `RandomAccessFile`-over-`std::fs::File` pattern (`StdFile` in
//! `stratum-vfs`, itself adapted from the teacher's file-extension-trait
//! implementations).
use std::path::PathBuf;

use stratum_vfs::StdFile;

use crate::cache::TableSource;
use crate::error::{Error, Result};
use crate::filename::table_file_candidates;

/// Opens table files under `db_directory`, one name attempt at a time: the
/// `.ldb` candidate first, then the legacy `.sst` candidate only if the
/// first attempt's `IoError` suggests the file is simply missing under that
/// name (any other error propagates immediately, per §7's "further IoErrors
/// propagate" policy — the single retry is for the name, not for retrying
/// the same open).
pub struct DiskTableSource {
    db_directory: PathBuf,
}

impl DiskTableSource {
    #[must_use]
    pub fn new(db_directory: PathBuf) -> Self {
        Self { db_directory }
    }
}

impl TableSource for DiskTableSource {
    type File = StdFile;

    fn open(&self, file_number: u64) -> Result<(Self::File, u64)> {
        let [preferred, legacy] = table_file_candidates(&self.db_directory, file_number);

        match open_at(&preferred) {
            Ok(opened) => Ok(opened),
            Err(Error::Io(io_error)) => {
                tracing::debug!(
                    path = %preferred.display(),
                    error = %io_error,
                    "preferred table extension missing, falling back to legacy name"
                );
                open_at(&legacy)
            }
            Err(other) => Err(other),
        }
    }
}

fn open_at(path: &std::path::Path) -> Result<(StdFile, u64)> {
    let file = std::fs::File::open(path)?;
    let file_size = file.metadata()?.len();
    Ok((StdFile::new(file), file_size))
}
