//! Parses a table's footer, metaindex block, filter block, and index block,
//! and serves the classical (non-learned) point-lookup path, C2.
//!
//! Grounded in the teacher's `Table::new` parsing order (footer, then
//! metaindex, then filter, then index) and its `TableBlockReader` read path
//! (caller-local scratch buffer, crc32c checksum verification against the
//! masked checksum in the block trailer) in `table/table_struct.rs` and
//! `table/read.rs`. Simplified to a single concrete comparator and no
//! compression (every block is stored raw); the learned paths in
//! `learned_reader` and `learned_probe` never decompress — adding
//! compression to this crate would require teaching them to, which the spec
//! does not ask for.
use std::cmp::Ordering;

use stratum_vfs::RandomAccess;

use crate::block::IndexBlock;
use crate::comparator::{resolve_snapshot_entry, split_internal_key, InternalKeyComparator, TableComparator};
use crate::error::{Error, Result};
use crate::filter_block::FilterBlockReader;
use crate::format::{self, decode_fixed_entry, BlockHandle, TableFooter, BLOCK_TRAILER_LEN, FILTER_META_PREFIX};
use crate::layout::TableLayout;

/// Everything needed to parse and query one table file.
pub struct Table<F> {
    file: F,
    comparator: InternalKeyComparator,
    verify_checksums: bool,
    layout: TableLayout,

    index_block: IndexBlock,
    filter_block: Option<FilterBlockReader>,
    num_entries: u64,
}

impl<F: RandomAccess> Table<F> {
    /// Parses `file`'s footer, metaindex block, optional filter block, and
    /// index block, in that order, matching the teacher's `Table::new`.
    pub fn new(file: F, file_size: u64, layout: TableLayout, verify_checksums: bool) -> Result<Self> {
        let footer_offset = file_size
            .checked_sub(TableFooter::ENCODED_LENGTH as u64)
            .ok_or_else(|| Error::corruption("table file too small to contain a footer"))?;
        let mut footer_buf = vec![0_u8; TableFooter::ENCODED_LENGTH];
        file.read_exact_at(footer_offset, &mut footer_buf)?;
        let footer = TableFooter::decode_from(&footer_buf)?;

        let mut scratch = Vec::new();
        let metaindex_contents =
            read_block(&file, footer.metaindex, verify_checksums, &mut scratch)?;
        let metaindex_block = IndexBlock::decode(&metaindex_contents)?;

        let filter_block = read_filter_block(&file, &metaindex_block, verify_checksums, &mut scratch)?;

        let index_contents = read_block(&file, footer.index, verify_checksums, &mut scratch)?;
        let index_block = IndexBlock::decode(&index_contents)?;

        // Every data block but possibly the last is packed full
        // (`layout.block_num_entries` entries); the last block's real entry
        // count is recovered from its index handle's recorded byte size
        // rather than assumed, since a table's key count need not be a
        // multiple of `block_num_entries`.
        let mut num_entries = 0_u64;
        for (_, handle_bytes) in index_block.entries() {
            let (handle, _) = BlockHandle::decode_from(handle_bytes)
                .ok_or_else(|| Error::corruption("malformed index block entry"))?;
            if handle.size % layout.entry_size != 0 {
                return Err(Error::corruption("data block size is not a multiple of entry_size"));
            }
            num_entries += handle.size / layout.entry_size;
        }

        Ok(Self {
            file,
            comparator: InternalKeyComparator::new(),
            verify_checksums,
            layout,
            index_block,
            filter_block,
            num_entries,
        })
    }

    #[must_use]
    pub fn layout(&self) -> TableLayout {
        self.layout
    }

    #[must_use]
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    #[must_use]
    pub fn index_block(&self) -> &IndexBlock {
        &self.index_block
    }

    /// The largest in-block position holding a real entry in data block
    /// `block_index`. Equal to `layout.last_position_in_block()` for every
    /// block except possibly the last, which may hold fewer than
    /// `block_num_entries` entries if `num_entries` isn't a multiple of it.
    #[must_use]
    pub fn last_position_in_block(&self, block_index: u64) -> u64 {
        let block_start = self.layout.block_global_start(block_index);
        let entries_in_block = self.num_entries.saturating_sub(block_start).min(self.layout.block_num_entries);
        entries_in_block.saturating_sub(1)
    }

    /// The classical (C2) baseline point lookup: binary-search the index
    /// block for the candidate data block, consult the filter if present,
    /// then scan the block's fixed-width entries for the target's
    /// lower-bound position and resolve it the way the original's
    /// `SaveValue` callback does — by user-key equality and entry type,
    /// not by full internal-key equality. `internal_key`'s sequence number
    /// only steers which *version* of the user key the scan lands on (the
    /// newest one not newer than the requested snapshot); the target's own
    /// packed suffix essentially never matches a stored entry's exactly, so
    /// gating on full internal-key equality would report every present key
    /// as absent.
    pub fn internal_get(&self, internal_key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(block_handle_bytes) = self.index_block.seek(internal_key, &self.comparator) else {
            return Ok(None);
        };
        let (block_handle, _) = BlockHandle::decode_from(block_handle_bytes)
            .ok_or_else(|| Error::corruption("malformed index block entry"))?;

        let (target_user_key, _) = split_internal_key(internal_key)
            .ok_or_else(|| Error::corruption("internal key shorter than the sequence/type suffix"))?;

        if let Some(filter) = &self.filter_block {
            if !filter.key_may_match(block_handle.offset, target_user_key) {
                return Ok(None);
            }
        }

        let mut buf = vec![0_u8; block_handle.size as usize];
        self.file.read_exact_at(block_handle.offset, &mut buf)?;

        for chunk in buf.chunks(self.layout.entry_size as usize) {
            let entry = decode_fixed_entry(chunk)?;
            match self.comparator.cmp(entry.key, internal_key) {
                Ordering::Less => continue,
                Ordering::Equal | Ordering::Greater => {
                    return Ok(resolve_snapshot_entry(entry.key, entry.value, target_user_key)?
                        .map(|(_, value)| value.to_vec()));
                }
            }
        }
        Ok(None)
    }

    /// Reads the fixed-width entry at global position `pos`, the primitive
    /// the learned read paths use once they've settled on an exact position.
    pub fn read_entry_at(&self, pos: u64, buf: &mut Vec<u8>) -> Result<()> {
        let block_index = self.layout.block_of_position(pos);
        let within_block = pos - self.layout.block_global_start(block_index);
        let offset = self.layout.block_offset(block_index) + within_block * self.layout.entry_size;

        buf.resize(self.layout.entry_size as usize, 0);
        self.file.read_exact_at(offset, buf)?;
        Ok(())
    }

    /// A raw positioned read, for callers (the learned paths) that already
    /// know the exact byte range they want and don't go through
    /// [`Table::read_entry_at`]'s position-to-offset arithmetic.
    pub fn read_raw_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.read_exact_at(offset, buf)?;
        Ok(())
    }

    /// Whether the filter block proves `user_key` is absent from the data
    /// block at `block_index`. `false` when there is no filter block to
    /// consult (never rules anything out) or when the filter reports a
    /// possible match.
    #[must_use]
    pub fn filter_rules_out(&self, block_index: u64, user_key: &[u8]) -> bool {
        match &self.filter_block {
            Some(filter) => !filter.key_may_match(self.layout.block_offset(block_index), user_key),
            None => false,
        }
    }

    /// A forward iterator over every entry in internal-key order, for
    /// compaction input iteration and full-table scans. Built on
    /// [`Table::read_entry_at`], the same primitive the learned paths use
    /// once they've settled on a position.
    pub fn new_iterator(&self) -> Result<TableIterator<'_, F>> {
        TableIterator::new(self)
    }
}

/// A table's entries in order, positioned by global entry index rather than
/// block boundaries. Exposes the same explicit `valid`/`key`/`value`/`next`
/// shape as `stratum_core`'s merging iterator rather than `std::iter::Iterator`,
/// since advancing can fail (a corrupt entry) and the caller needs to observe
/// that failure rather than have it swallowed.
pub struct TableIterator<'t, F> {
    table: &'t Table<F>,
    pos: u64,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl<'t, F: RandomAccess> TableIterator<'t, F> {
    fn new(table: &'t Table<F>) -> Result<Self> {
        let mut iter = Self { table, pos: 0, current: None };
        iter.load()?;
        Ok(iter)
    }

    fn load(&mut self) -> Result<()> {
        if self.pos >= self.table.num_entries() {
            self.current = None;
            return Ok(());
        }
        let mut buf = Vec::new();
        self.table.read_entry_at(self.pos, &mut buf)?;
        let decoded = decode_fixed_entry(&buf)?;
        self.current = Some((decoded.key.to_vec(), decoded.value.to_vec()));
        Ok(())
    }

    /// Whether the iterator currently points at an entry. `false` once every
    /// entry has been consumed.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// The current entry's internal key. Panics if `!valid()`.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.current.as_ref().expect("valid() checked by caller").0
    }

    /// The current entry's value. Panics if `!valid()`.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.current.as_ref().expect("valid() checked by caller").1
    }

    /// Advances to the next entry.
    pub fn next(&mut self) -> Result<()> {
        self.pos += 1;
        self.load()
    }
}

/// Reads and checksum-verifies one block, writing into a caller-supplied
/// scratch buffer that is cleared before returning. Grounded in the
/// teacher's `TableBlockReader::read_table_block`, minus decompression.
fn read_block<F: RandomAccess>(
    file: &F,
    handle: BlockHandle,
    verify_checksums: bool,
    scratch: &mut Vec<u8>,
) -> Result<Vec<u8>> {
    let block_size = handle.size as usize;
    scratch.resize(block_size + BLOCK_TRAILER_LEN, 0);
    file.read_exact_at(handle.offset, scratch)?;

    let (block, trailer) = scratch.split_at(block_size);
    let compressor_id = trailer[0];
    let masked_checksum = u32::from_le_bytes(trailer[1..5].try_into().expect("4 bytes"));

    if verify_checksums {
        let unmasked = format::unmask_checksum(masked_checksum);
        let computed = crc32c::crc32c_append(crc32c::crc32c(block), &[compressor_id]);
        if unmasked != computed {
            tracing::warn!(
                offset = handle.offset,
                size = handle.size,
                "block checksum mismatch"
            );
            return Err(Error::corruption("block checksum mismatch"));
        }
    }

    let out = block.to_vec();
    scratch.clear();
    Ok(out)
}

fn read_filter_block<F: RandomAccess>(
    file: &F,
    metaindex_block: &IndexBlock,
    verify_checksums: bool,
    scratch: &mut Vec<u8>,
) -> Result<Option<FilterBlockReader>> {
    let mut meta_key = FILTER_META_PREFIX.to_vec();
    meta_key.extend_from_slice(b"leveldb.BuiltinBloomFilter");

    let Some(handle_bytes) = metaindex_block.get(&meta_key) else {
        return Ok(None);
    };
    let (filter_handle, _) = BlockHandle::decode_from(handle_bytes)
        .ok_or_else(|| Error::corruption("malformed metaindex filter handle"))?;
    if filter_handle.size == 0 {
        return Ok(None);
    }

    let contents = read_block(file, filter_handle, verify_checksums, scratch)?;
    Ok(Some(FilterBlockReader::new(contents)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::ValueType;
    use crate::test_support::{build_table, internal_key, internal_key_with_type};

    #[test]
    fn internal_get_resolves_by_user_key_not_by_snapshot_sequence() {
        // The entry is written at seq=3; a lookup for the same user key at a
        // much later snapshot sequence (seq=50) must still find it, since no
        // stored entry's internal key will ever equal the query's.
        let layout = TableLayout::new(33, 4, BLOCK_TRAILER_LEN as u64);
        let entries: Vec<(Vec<u8>, &[u8])> = (0..10_u64)
            .map(|i| (internal_key(format!("key{i:04}").as_bytes(), 3), b"value".as_slice()))
            .collect();
        let (file, size) = build_table(&entries, layout);
        let table = Table::new(file, size, layout, true).unwrap();

        let query = internal_key(b"key0003", 50);
        assert_eq!(table.internal_get(&query).unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn internal_get_reports_a_deletion_tombstone_as_absent() {
        let layout = TableLayout::new(33, 4, BLOCK_TRAILER_LEN as u64);
        let mut entries: Vec<(Vec<u8>, &[u8])> = (0..10_u64)
            .map(|i| (internal_key(format!("key{i:04}").as_bytes(), 1), b"value".as_slice()))
            .collect();
        entries[4] = (internal_key_with_type(b"key0004", 1, ValueType::Deletion), b"stale".as_slice());
        let (file, size) = build_table(&entries, layout);
        let table = Table::new(file, size, layout, true).unwrap();

        let query = internal_key(b"key0004", 5);
        assert_eq!(table.internal_get(&query).unwrap(), None);
    }

    #[test]
    fn new_iterator_yields_every_entry_in_order() {
        let layout = TableLayout::new(33, 4, BLOCK_TRAILER_LEN as u64);
        let entries: Vec<(Vec<u8>, &[u8])> = (0..10_u64)
            .map(|i| (internal_key(format!("key{i:04}").as_bytes(), 1), b"value".as_slice()))
            .collect();
        let (file, size) = build_table(&entries, layout);
        let table = Table::new(file, size, layout, true).unwrap();

        let mut iter = table.new_iterator().unwrap();
        let mut seen = Vec::new();
        while iter.valid() {
            seen.push((iter.key().to_vec(), iter.value().to_vec()));
            iter.next().unwrap();
        }
        let expected: Vec<(Vec<u8>, Vec<u8>)> =
            entries.iter().map(|(k, v)| (k.clone(), v.to_vec())).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn internal_get_finds_present_and_absent_keys() {
        let layout = TableLayout::new(33, 4, BLOCK_TRAILER_LEN as u64);
        let entries: Vec<(Vec<u8>, &[u8])> = (0..10_u64)
            .map(|i| (internal_key(format!("key{i:04}").as_bytes(), 1), b"value".as_slice()))
            .collect();
        let (file, size) = build_table(&entries, layout);

        let table = Table::new(file, size, layout, true).unwrap();
        let found = table.internal_get(&entries[3].0).unwrap();
        assert_eq!(found, Some(b"value".to_vec()));

        let missing = internal_key(b"not-a-real-key", 1);
        assert_eq!(table.internal_get(&missing).unwrap(), None);
    }

    #[test]
    fn read_entry_at_matches_internal_get() {
        let layout = TableLayout::new(33, 4, BLOCK_TRAILER_LEN as u64);
        let entries: Vec<(Vec<u8>, &[u8])> = (0..10_u64)
            .map(|i| (internal_key(format!("key{i:04}").as_bytes(), 1), b"value".as_slice()))
            .collect();
        let (file, size) = build_table(&entries, layout);

        let table = Table::new(file, size, layout, true).unwrap();
        let mut buf = Vec::new();
        table.read_entry_at(7, &mut buf).unwrap();
        let decoded = decode_fixed_entry(&buf).unwrap();
        assert_eq!(decoded.key, entries[7].0.as_slice());
    }
}
