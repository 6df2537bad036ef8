//! SST footer/index/filter parsing, the classical (C2) table reader, the
//! LRU table cache with learned lookup (C1), the learned file reader (C3),
//! and the learned compaction probe (C4).
//!
//! `stratum_core` builds the learned merging iterator (C5) and the
//! `FileMetaData`/`Level`-shaped types on top of [`TableCache`] and
//! [`learned_probe::get_for_compaction`].

mod block;
mod cache;
mod comparator;
mod disk_source;
mod error;
mod filename;
mod filter_block;
mod format;
mod layout;
mod learned_probe;
mod learned_reader;
mod model;
mod stats;
mod table;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use cache::{TableCache, TableSource};
pub use comparator::{
    common_prefix_len, pack_sequence_and_type, split_internal_key, unpack_sequence_and_type,
    InternalKeyComparator, LexicographicComparator, TableComparator, ValueType,
    INTERNAL_KEY_SUFFIX_LEN,
};
pub use disk_source::DiskTableSource;
pub use error::{Error, Result};
pub use filename::{table_file_candidates, TableFileName};
pub use format::{
    decode_fixed_entry, encode_fixed_entry, BlockHandle, DecodedEntry, TableFooter,
    BLOCK_TRAILER_LEN,
};
pub use layout::{LearnedMode, TableLayout};
pub use learned_probe::get_for_compaction;
pub use model::{numeric_key_prefix, LearnedModel, PiecewiseLinearModel, Prediction};
pub use stats::{Stats, TimerStat};
pub use table::{Table, TableIterator};
