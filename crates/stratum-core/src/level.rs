//! A compaction input's file set: the one or more SSTs that back a single
//! child of the [`crate::merge_iter::LearnedMergingIterator`].
//!
//! At level 0, input files can have overlapping key ranges, so a compaction
//! normally feeds one file per input. At levels above 0, sibling files are
//! disjoint and sorted, and a single input walks several files back to
//! back — exactly the case §4.5's limit computation calls out with "an
//! accumulated file offset (sum of `num_keys` for preceding files in the
//! input at levels > 0)". [`FileSet`] is the one place that offset is
//! computed, so the merge iterator and the compaction probe agree on it.
use std::sync::Arc;

use crate::file_meta::FileMetaData;

/// The sorted files backing one merge input, plus the level they live at
/// (level 0's overlap rule only matters to the caller that built this set;
/// the merge iterator itself just walks the files in order).
#[derive(Debug, Clone)]
pub struct FileSet {
    level: usize,
    files: Vec<Arc<FileMetaData>>,
}

impl FileSet {
    /// `files` must already be sorted by key range (ascending); for level 0
    /// that is simply "however compaction selected them", for levels above 0
    /// it is the level's own disjoint ordering.
    #[must_use]
    pub fn new(level: usize, files: Vec<Arc<FileMetaData>>) -> Self {
        Self { level, files }
    }

    #[must_use]
    pub const fn level(&self) -> usize {
        self.level
    }

    #[must_use]
    pub fn files(&self) -> &[Arc<FileMetaData>] {
        &self.files
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total entries across every file in this input, the limit a
    /// [`crate::merge_iter::LearnedMergingIterator`] input owns outright once
    /// `second_smallest` goes absent (§4.5: "the merger owns the remainder of
    /// the current smallest input").
    #[must_use]
    pub fn total_keys(&self) -> u64 {
        self.files.iter().map(|f| f.num_keys()).sum()
    }

    /// The index of `file_number` within this set, if present.
    #[must_use]
    pub fn index_of(&self, file_number: u64) -> Option<usize> {
        self.files.iter().position(|f| f.file_number() == file_number)
    }

    /// The sum of `num_keys` for every file strictly before `file_number` in
    /// this set: the offset that must be added to a compaction probe's
    /// file-local position to recover this input's global position.
    ///
    /// Returns 0 if `file_number` is the first file or is not present (the
    /// latter is a caller error; it is not treated as fatal here because the
    /// merge iterator only ever calls this with a file number it just read
    /// the current entry from).
    #[must_use]
    pub fn accumulated_offset_before(&self, file_number: u64) -> u64 {
        let Some(index) = self.index_of(file_number) else {
            return 0;
        };
        self.files[..index].iter().map(|f| f.num_keys()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(file_number: u64, num_keys: u64) -> Arc<FileMetaData> {
        FileMetaData::new(file_number, 4096, b"a".to_vec(), b"z".to_vec(), num_keys, 100)
    }

    #[test]
    fn accumulated_offset_sums_preceding_files() {
        let set = FileSet::new(1, vec![meta(1, 10), meta(2, 20), meta(3, 30)]);
        assert_eq!(set.accumulated_offset_before(1), 0);
        assert_eq!(set.accumulated_offset_before(2), 10);
        assert_eq!(set.accumulated_offset_before(3), 30);
        assert_eq!(set.total_keys(), 60);
    }

    #[test]
    fn unknown_file_number_has_zero_offset() {
        let set = FileSet::new(0, vec![meta(1, 10)]);
        assert_eq!(set.accumulated_offset_before(999), 0);
    }
}
