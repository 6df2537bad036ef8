//! `FileMetaData` (§3): the immutable, refcounted per-SST descriptor that a
//! `Version` hands to the read path. Modeled on the teacher's
//! `version::file_metadata::FileMetadata` — the same smallest/largest-key
//! pair and seek-based compaction trigger — generalized with the one field
//! the learned path needs that the teacher's classical reader has no use
//! for: `num_keys`, which the compaction probe's global-position arithmetic
//! (§4.4's "accumulated file offset") depends on.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Guards against `record_seek` wrapping an `AtomicU32` counter all the way
/// back around to a value that looks like "seeks remaining", mirroring the
/// teacher's own `MAX_SEEKS_BETWEEN_COMPACTIONS` guard.
pub const MAX_SEEKS_BETWEEN_COMPACTIONS: u32 = (1 << 31) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeeksRemaining {
    Some,
    None,
}

/// An immutable per-SST descriptor, refcounted so that a file can outlive
/// the `Version` that first referenced it for as long as any in-flight read
/// or compaction still holds a handle (I1's "lives for the lifetime of the
/// version that references it; refcounted").
#[derive(Debug)]
pub struct FileMetaData {
    file_number: u64,
    file_size: u64,
    smallest_key: Vec<u8>,
    largest_key: Vec<u8>,
    num_keys: u64,
    remaining_seeks: AtomicU32,
}

impl FileMetaData {
    #[must_use]
    pub fn new(
        file_number: u64,
        file_size: u64,
        smallest_key: Vec<u8>,
        largest_key: Vec<u8>,
        num_keys: u64,
        allowed_seeks: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            file_number,
            file_size,
            smallest_key,
            largest_key,
            num_keys,
            remaining_seeks: AtomicU32::new(allowed_seeks.min(MAX_SEEKS_BETWEEN_COMPACTIONS)),
        })
    }

    #[must_use]
    pub const fn file_number(&self) -> u64 {
        self.file_number
    }

    #[must_use]
    pub const fn file_size(&self) -> u64 {
        self.file_size
    }

    #[must_use]
    pub fn smallest_key(&self) -> &[u8] {
        &self.smallest_key
    }

    #[must_use]
    pub fn largest_key(&self) -> &[u8] {
        &self.largest_key
    }

    /// Total number of entries stored in this file; the file's last global
    /// position (per the learned path's fixed-entry layout) is
    /// `num_keys - 1`.
    #[must_use]
    pub const fn num_keys(&self) -> u64 {
        self.num_keys
    }

    /// Records a seek that landed in this file without finding its target,
    /// the classical heuristic for scheduling a compaction. Not consulted
    /// by the learned read path, kept for parity with the teacher's
    /// `FileMetadata` since a `Version` built from real compaction state
    /// still needs it.
    pub fn record_seek(&self) -> SeeksRemaining {
        // `fetch_sub` returns the value *before* the decrement, so the seek
        // that brings the counter to zero has a previous value of 1, and an
        // already-exhausted counter (previous value 0) would otherwise wrap
        // an `AtomicU32` all the way around instead of staying pinned at 0.
        let previous = self.remaining_seeks.fetch_sub(1, Ordering::Relaxed);
        if previous <= 1 || previous > MAX_SEEKS_BETWEEN_COMPACTIONS {
            self.remaining_seeks.store(0, Ordering::Relaxed);
            SeeksRemaining::None
        } else {
            SeeksRemaining::Some
        }
    }
}
