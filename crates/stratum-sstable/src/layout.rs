//! Per-table byte layout for the fixed-width learned read path.
//!
//! The distilled spec's block-stride constants (`STRIDE = 4133`,
//! `N_PER_BLOCK = 125`) are observed values for one particular workload, not
//! universal constants; the upstream implementation hard-codes them in the
//! compaction probe while computing block offsets elsewhere from a
//! differently-defined `block_size` that omits the per-block trailer,
//! producing two inconsistent notions of "the byte stride of a block" in the
//! same code path (see Open Question 1 / DESIGN.md).
//!
//! `TableLayout` is the single source of truth: every block offset and every
//! global-position computation in this crate goes through it, so the two
//! notions can never diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    /// Width in bytes of one fixed-size entry record (header + key + value).
    pub entry_size: u64,
    /// Number of fixed-size entries packed into one data block.
    pub block_num_entries: u64,
    /// Bytes of trailer (checksum + compression/type byte, plus any padding)
    /// appended after a block's entry data on disk.
    pub block_trailer_len: u64,
}

impl Default for TableLayout {
    /// The observed YCSB-style entry/block sizing from §6 (33-byte entries,
    /// 125 per block), with the trailer length set to *this crate's own*
    /// on-disk block trailer (`format::BLOCK_TRAILER_LEN`: one compressor
    /// byte plus a four-byte masked checksum) rather than the spec's quoted
    /// `4133`-byte stride, which assumes an 8-byte trailer this crate's own
    /// table format does not produce. Per Open Question 1, the stride must
    /// be derived from the table format actually in use, not hard-coded from
    /// an external observation; using any other trailer length here would
    /// make `Config::default()`'s layout silently disagree with every table
    /// `stratum_sstable::test_support::build_table` (and the real write path
    /// it mirrors) actually writes. Callers building tables with a different
    /// entry/value width still need their own `TableLayout`.
    fn default() -> Self {
        Self {
            entry_size: 33,
            block_num_entries: 125,
            block_trailer_len: crate::format::BLOCK_TRAILER_LEN as u64,
        }
    }
}

impl TableLayout {
    #[must_use]
    pub const fn new(entry_size: u64, block_num_entries: u64, block_trailer_len: u64) -> Self {
        Self {
            entry_size,
            block_num_entries,
            block_trailer_len,
        }
    }

    /// Bytes of entry data (no trailer) in one data block.
    #[must_use]
    pub const fn block_data_size(&self) -> u64 {
        self.entry_size * self.block_num_entries
    }

    /// Total on-disk byte stride of one data block, data plus trailer.
    #[must_use]
    pub const fn block_stride(&self) -> u64 {
        self.block_data_size() + self.block_trailer_len
    }

    /// The zero-based index of the data block containing entry position `pos`.
    #[must_use]
    pub const fn block_of_position(&self, pos: u64) -> u64 {
        pos / self.block_num_entries
    }

    /// The byte offset in the table file of the first entry of data block `block_index`.
    #[must_use]
    pub const fn block_offset(&self, block_index: u64) -> u64 {
        block_index * self.block_stride()
    }

    /// The global (whole-file) entry position of the first entry of data block `block_index`.
    ///
    /// Unlike the upstream implementation, this never needs to recover
    /// `block_index` by dividing a byte offset back down — callers that
    /// already have `block_index` (as every caller in this crate does) pass
    /// it directly, so the `4133`/`125` round trip, and the bug it invited,
    /// does not arise.
    #[must_use]
    pub const fn block_global_start(&self, block_index: u64) -> u64 {
        block_index * self.block_num_entries
    }

    /// The maximum entry position addressable within a single block (`block_num_entries - 1`).
    #[must_use]
    pub const fn last_position_in_block(&self) -> u64 {
        self.block_num_entries - 1
    }
}

/// Controls whether the learned read path is attempted at all.
///
/// Stands in for the raw `MOD` knob (`{6, 7, 9}` vs. other values) described
/// in §6, made into a typed enum per §9's guidance to replace ad hoc global
/// flags with an explicit, passed-down context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LearnedMode {
    /// Classical path only; never consult a model.
    #[default]
    Disabled,
    /// Consult the per-file model when no level-wide model is active.
    PerFile,
    /// A level-wide model is active; always take the learned path for
    /// files at that level (bypassing the per-file model entirely).
    LevelWide,
}

impl LearnedMode {
    #[must_use]
    pub const fn consults_file_model(self) -> bool {
        matches!(self, Self::PerFile | Self::LevelWide)
    }
}
