//! `FileMetaData`/`Level` types, process-wide configuration, and the
//! learned merging iterator (C5) that sits on top of [`stratum_sstable`]'s
//! table cache and learned compaction probe (C4).
mod config;
mod error;
mod file_meta;
mod level;
mod merge_iter;

pub use config::{Config, ModelSource, NoModels};
pub use error::{Error, Result};
pub use file_meta::{FileMetaData, SeeksRemaining, MAX_SEEKS_BETWEEN_COMPACTIONS};
pub use level::FileSet;
pub use merge_iter::LearnedMergingIterator;
