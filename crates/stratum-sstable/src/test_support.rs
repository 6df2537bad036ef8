//! Synthetic SST construction shared by this crate's own tests and, under
//! the `test-support` feature, by `stratum-core`'s integration tests — both
//! need the same "build a table file byte-for-byte" helper rather than each
//! reimplementing footer/index/filter block encoding.
#![cfg(any(test, feature = "test-support"))]

use integer_encoding::VarInt;
use stratum_vfs::MemoryFile;

use crate::comparator::{pack_sequence_and_type, ValueType};
use crate::filter_block::{BloomPolicy, FilterBlockBuilder};
use crate::format::{encode_fixed_entry, mask_checksum, BlockHandle, TableFooter, FILTER_META_PREFIX};
use crate::layout::TableLayout;

/// Packs `user_key` with a `(seq << 8 | 1)` sequence/type suffix, the same
/// internal-key shape `comparator::split_internal_key` expects.
#[must_use]
pub fn internal_key(user_key: &[u8], seq: u64) -> Vec<u8> {
    internal_key_with_type(user_key, seq, ValueType::Value)
}

/// As [`internal_key`], but with an explicit value type — for building
/// fixtures with deletion tombstones or multiple versions of the same user
/// key at different sequence numbers.
#[must_use]
pub fn internal_key_with_type(user_key: &[u8], seq: u64, value_type: ValueType) -> Vec<u8> {
    let mut key = user_key.to_vec();
    key.extend_from_slice(&pack_sequence_and_type(seq, value_type).to_le_bytes());
    key
}

/// Builds a complete table file from already-internal-keyed `entries`,
/// packing `layout.block_num_entries` per data block and a Bloom filter
/// keyed on each entry's user-key portion (matching `Table::internal_get`'s
/// filter semantics).
#[must_use]
pub fn build_table(entries: &[(Vec<u8>, &[u8])], layout: TableLayout) -> (MemoryFile, u64) {
    use crate::comparator::split_internal_key;

    let mut file = Vec::new();
    let mut filter_builder = FilterBlockBuilder::new(BloomPolicy::new(10));

    let mut block_buf = Vec::new();
    let mut index_entries: Vec<(Vec<u8>, BlockHandle)> = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let block_start = file.len() as u64 + block_buf.len() as u64;
        filter_builder.start_block(block_start);

        let end = (i + layout.block_num_entries as usize).min(entries.len());
        for (key, value) in &entries[i..end] {
            let (user_key, _) = split_internal_key(key).expect("internal key has a suffix");
            filter_builder.add_key(user_key);
            block_buf.extend_from_slice(&encode_fixed_entry(key, value, layout.entry_size as usize));
        }
        let last_key = entries[end - 1].0.clone();

        let block_offset = file.len() as u64;
        let checksum = crc32c::crc32c_append(crc32c::crc32c(&block_buf), &[0]);
        file.extend_from_slice(&block_buf);
        file.push(0);
        file.extend_from_slice(&mask_checksum(checksum).to_le_bytes());

        index_entries.push((last_key, BlockHandle { offset: block_offset, size: block_buf.len() as u64 }));
        block_buf.clear();
        i = end;
    }

    let mut index_block_bytes = Vec::new();
    for (key, handle) in &index_entries {
        encode_block_entry(&mut index_block_bytes, key, &{
            let mut v = Vec::new();
            (*handle).encode_to(&mut v);
            v
        });
    }
    index_block_bytes.extend_from_slice(&0_u32.to_le_bytes());
    index_block_bytes.extend_from_slice(&1_u32.to_le_bytes());
    let index_offset = file.len() as u64;
    let index_checksum = crc32c::crc32c_append(crc32c::crc32c(&index_block_bytes), &[0]);
    file.extend_from_slice(&index_block_bytes);
    file.push(0);
    file.extend_from_slice(&mask_checksum(index_checksum).to_le_bytes());
    let index_handle = BlockHandle { offset: index_offset, size: index_block_bytes.len() as u64 };

    let filter_contents = filter_builder.finish();
    let mut metaindex_block_bytes = Vec::new();
    let mut meta_key = FILTER_META_PREFIX.to_vec();
    meta_key.extend_from_slice(b"leveldb.BuiltinBloomFilter");
    let filter_offset = file.len() as u64;
    let filter_checksum = crc32c::crc32c_append(crc32c::crc32c(&filter_contents), &[0]);
    file.extend_from_slice(&filter_contents);
    file.push(0);
    file.extend_from_slice(&mask_checksum(filter_checksum).to_le_bytes());
    let filter_handle = BlockHandle { offset: filter_offset, size: filter_contents.len() as u64 };
    encode_block_entry(&mut metaindex_block_bytes, &meta_key, &{
        let mut v = Vec::new();
        filter_handle.encode_to(&mut v);
        v
    });
    metaindex_block_bytes.extend_from_slice(&0_u32.to_le_bytes());
    metaindex_block_bytes.extend_from_slice(&1_u32.to_le_bytes());
    let metaindex_offset = file.len() as u64;
    let metaindex_checksum = crc32c::crc32c_append(crc32c::crc32c(&metaindex_block_bytes), &[0]);
    file.extend_from_slice(&metaindex_block_bytes);
    file.push(0);
    file.extend_from_slice(&mask_checksum(metaindex_checksum).to_le_bytes());
    let metaindex_handle = BlockHandle { offset: metaindex_offset, size: metaindex_block_bytes.len() as u64 };

    let footer = TableFooter { metaindex: metaindex_handle, index: index_handle };
    file.extend_from_slice(&footer.encode());

    let len = file.len() as u64;
    (MemoryFile::new(file), len)
}

fn encode_block_entry(out: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    out.extend_from_slice(&0_u32.encode_var_vec());
    out.extend_from_slice(&(key.len() as u32).encode_var_vec());
    out.extend_from_slice(&(value.len() as u32).encode_var_vec());
    out.extend_from_slice(key);
    out.extend_from_slice(value);
}
