//! On-disk footer/block-handle format and the fixed-width entry encoding
//! used by the learned read path.
//!
//! The footer and [`BlockHandle`] varint encoding mirror a standard SST
//! format (metaindex handle + index handle + magic number). The fixed-width
//! entry encoding (§3's "Entry layout assumptions") is the format the
//! learned paths (C3/C4) read directly by arithmetic, bypassing block
//! iteration: `shared = 0`, `non_shared`, `value_length`, key bytes, value
//! bytes, zero-padded out to [`TableLayout::entry_size`].
//!
//! [`TableLayout::entry_size`]: crate::layout::TableLayout::entry_size
use integer_encoding::VarInt;

use crate::error::{Error, Result};

/// One byte for the compressor id, four bytes for a masked crc32c checksum.
pub const BLOCK_TRAILER_LEN: usize = 5;

/// Prefix under which a filter policy's name is stored as a key in the
/// metaindex block, mapping to the [`BlockHandle`] of its filter block.
pub const FILTER_META_PREFIX: &[u8] = b"filter.";

const CHECKSUM_MASK_DELTA: u32 = 0x_a282_ead8;

/// Checksums are stored rotated and offset so that a block of zeros (or
/// other low-entropy data) doesn't produce a low-entropy checksum either.
#[must_use]
pub const fn mask_checksum(unmasked: u32) -> u32 {
    unmasked.rotate_right(15).wrapping_add(CHECKSUM_MASK_DELTA)
}

#[must_use]
pub const fn unmask_checksum(masked: u32) -> u32 {
    masked.wrapping_sub(CHECKSUM_MASK_DELTA).rotate_left(15)
}

/// The offset and size of a block within a table file.
#[derive(Debug, Clone, Copy)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    pub const MAX_ENCODED_LENGTH: usize = 20;

    #[must_use]
    pub fn decode_from(input: &[u8]) -> Option<(Self, usize)> {
        let (offset, offset_len) = u64::decode_var(input)?;
        let (size, size_len) = u64::decode_var(input.get(offset_len..)?)?;
        Some((Self { offset, size }, offset_len + size_len))
    }

    #[must_use]
    pub fn encode_to(self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.offset.encode_var_vec());
        output.extend_from_slice(&self.size.encode_var_vec());
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableFooter {
    pub metaindex: BlockHandle,
    pub index: BlockHandle,
}

impl TableFooter {
    pub const ENCODED_LENGTH: usize = 2 * BlockHandle::MAX_ENCODED_LENGTH + 8;
    pub const MAGIC: u64 = 0x_db47_7524_8b80_fb57;

    pub fn decode_from(input: &[u8]) -> Result<Self> {
        if input.len() < Self::ENCODED_LENGTH {
            return Err(Error::corruption("table footer shorter than expected"));
        }

        let magic_offset = Self::ENCODED_LENGTH - 8;
        let magic_bytes: [u8; 8] = input[magic_offset..Self::ENCODED_LENGTH]
            .try_into()
            .expect("exactly 8 bytes sliced");
        if u64::from_le_bytes(magic_bytes) != Self::MAGIC {
            return Err(Error::corruption("table footer magic number mismatch"));
        }

        let (metaindex, metaindex_len) =
            BlockHandle::decode_from(input).ok_or_else(|| Error::corruption("bad metaindex handle"))?;
        let (index, _) = BlockHandle::decode_from(&input[metaindex_len..])
            .ok_or_else(|| Error::corruption("bad index handle"))?;

        Ok(Self { metaindex, index })
    }

    #[must_use]
    pub fn encode(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LENGTH);
        self.metaindex.encode_to(&mut out);
        self.index.encode_to(&mut out);
        out.resize(Self::ENCODED_LENGTH - 8, 0);
        out.extend_from_slice(&Self::MAGIC.to_le_bytes());
        out
    }
}

/// A decoded fixed-width entry: a key and value slice borrowed from the
/// caller's read buffer.
#[derive(Debug, Clone, Copy)]
pub struct DecodedEntry<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
}

/// Decode one fixed-width entry from `record`, a slice exactly
/// [`TableLayout::entry_size`] bytes long (or the tail of the file, for the
/// last record in the table).
///
/// Per invariant I3/§4.3, `shared` must be 0 for every entry in this format;
/// a nonzero shared prefix is corruption, since the learned path never
/// builds up a key from a preceding restart.
///
/// [`TableLayout::entry_size`]: crate::layout::TableLayout::entry_size
pub fn decode_fixed_entry(record: &[u8]) -> Result<DecodedEntry<'_>> {
    let (shared, n) = u32::decode_var(record)
        .ok_or_else(|| Error::corruption("truncated entry: missing shared-length varint"))?;
    if shared != 0 {
        return Err(Error::corruption(format!(
            "fixed-width entry has nonzero shared prefix ({shared})"
        )));
    }
    let rest = &record[n..];

    let (non_shared, n) = u32::decode_var(rest)
        .ok_or_else(|| Error::corruption("truncated entry: missing key-length varint"))?;
    let rest = &rest[n..];

    let (value_length, n) = u32::decode_var(rest)
        .ok_or_else(|| Error::corruption("truncated entry: missing value-length varint"))?;
    let rest = &rest[n..];

    let non_shared = non_shared as usize;
    let value_length = value_length as usize;

    let key = rest
        .get(..non_shared)
        .ok_or_else(|| Error::corruption("truncated entry: key runs past record end"))?;
    let value = rest
        .get(non_shared..non_shared + value_length)
        .ok_or_else(|| Error::corruption("truncated entry: value runs past record end"))?;

    Ok(DecodedEntry { key, value })
}

/// Encode one fixed-width entry, zero-padded to `entry_size` bytes.
///
/// Used by tests to build synthetic table files; production tables are
/// built by the (out-of-scope) write path.
#[must_use]
pub fn encode_fixed_entry(key: &[u8], value: &[u8], entry_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(entry_size);
    out.extend_from_slice(&0_u32.encode_var_vec());
    out.extend_from_slice(&(key.len() as u32).encode_var_vec());
    out.extend_from_slice(&(value.len() as u32).encode_var_vec());
    out.extend_from_slice(key);
    out.extend_from_slice(value);
    assert!(
        out.len() <= entry_size,
        "encoded entry ({} bytes) does not fit in entry_size ({entry_size})",
        out.len(),
    );
    out.resize(entry_size, 0);
    out
}
