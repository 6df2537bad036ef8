//! Filter block reader for the classical read path (C2).
//!
//! The learned paths (C3/C4) never consult the filter block — they commit to
//! a position via the model and verify it in constant time instead of
//! ruling blocks out probabilistically — but C2 and [`Table::new`] still need
//! it, since the classical path is retained in full as the fallback/baseline.
//!
//! Existing LevelDB-derived implementations hardcode that one filter is
//! generated per 2048 bytes (2^11) of block data; that log2 is carried in the
//! filter block's own footer rather than assumed by the reader.
//!
//! [`Table::new`]: crate::table::Table::new
use crate::error::{Error, Result};

const FOOTER_LEN: usize = 5;
const U32_BYTES: usize = 4;

/// A standard Bloom filter policy: `bits_per_key` bits of filter storage per
/// key, double-hashed per the usual LevelDB scheme.
#[derive(Debug, Clone, Copy)]
pub struct BloomPolicy {
    bits_per_key: u32,
    k: u32,
}

impl BloomPolicy {
    #[must_use]
    pub fn new(bits_per_key: u32) -> Self {
        // 0.69 ~= ln(2); rounding the same way the reference policy does,
        // clamped to [1, 30] so pathological bits_per_key can't blow up scans.
        let k = ((bits_per_key as f64) * 0.69) as u32;
        let k = k.clamp(1, 30);
        Self { bits_per_key, k }
    }

    fn bloom_hash(key: &[u8]) -> u32 {
        hash(key, 0xbc9f_1d34)
    }

    #[must_use]
    pub fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8> {
        let bits = (keys.len() as u32 * self.bits_per_key).max(64);
        let bytes = bits.div_ceil(8) as usize;
        let bits = (bytes * 8) as u32;

        let mut filter = vec![0_u8; bytes];
        for key in keys {
            let mut h = Self::bloom_hash(key);
            let delta = (h >> 17) | (h << 15);
            for _ in 0..self.k {
                let bitpos = (h % bits) as usize;
                filter[bitpos / 8] |= 1 << (bitpos % 8);
                h = h.wrapping_add(delta);
            }
        }
        filter.push(self.k as u8);
        filter
    }

    #[must_use]
    pub fn key_may_match(key: &[u8], filter: &[u8]) -> bool {
        let Some((&k, bits_bytes)) = filter.split_last() else {
            return true;
        };
        if bits_bytes.is_empty() {
            return false;
        }
        if k > 30 {
            // Reserved for future filter encodings; treat as "might match".
            return true;
        }

        let bits = (bits_bytes.len() * 8) as u32;
        let mut h = Self::bloom_hash(key);
        let delta = (h >> 17) | (h << 15);
        for _ in 0..k {
            let bitpos = (h % bits) as usize;
            if bits_bytes[bitpos / 8] & (1 << (bitpos % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }
}

fn hash(data: &[u8], seed: u32) -> u32 {
    const M: u32 = 0xc6a4_a793;
    const R: u32 = 24;

    let mut h = seed ^ (data.len() as u32).wrapping_mul(M);
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let w = u32::from_le_bytes(chunk.try_into().expect("chunks_exact(4)"));
        h = h.wrapping_add(w);
        h = h.wrapping_mul(M);
        h ^= h >> 16;
    }
    let rem = chunks.remainder();
    for (i, &byte) in rem.iter().enumerate().rev() {
        h = h.wrapping_add((byte as u32) << (8 * i));
    }
    if !rem.is_empty() {
        h = h.wrapping_mul(M);
        h ^= h >> R;
    }
    h
}

/// Builds the filter block appended after the data blocks, one entry per
/// 2KiB-aligned run of blocks.
#[derive(Debug)]
pub struct FilterBlockBuilder {
    policy: BloomPolicy,
    filter_base_log2: u8,
    filters: Vec<u8>,
    filter_offsets: Vec<u32>,
    pending_keys: Vec<Vec<u8>>,
}

impl FilterBlockBuilder {
    #[must_use]
    pub fn new(policy: BloomPolicy) -> Self {
        Self {
            policy,
            filter_base_log2: 11,
            filters: Vec::new(),
            filter_offsets: Vec::new(),
            pending_keys: Vec::new(),
        }
    }

    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = block_offset >> self.filter_base_log2;
        while filter_index as usize > self.filter_offsets.len() {
            self.generate_filter();
        }
    }

    pub fn add_key(&mut self, key: &[u8]) {
        self.pending_keys.push(key.to_vec());
    }

    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        if !self.pending_keys.is_empty() {
            self.generate_filter();
        }

        let start_of_offsets = self.filters.len() as u32;
        for offset in &self.filter_offsets {
            self.filters.extend_from_slice(&offset.to_le_bytes());
        }
        self.filters.extend_from_slice(&start_of_offsets.to_le_bytes());
        self.filters.push(self.filter_base_log2);
        self.filters
    }

    fn generate_filter(&mut self) {
        self.filter_offsets.push(self.filters.len() as u32);
        if self.pending_keys.is_empty() {
            return;
        }
        let key_refs: Vec<&[u8]> = self.pending_keys.iter().map(Vec::as_slice).collect();
        self.filters.extend_from_slice(&self.policy.create_filter(&key_refs));
        self.pending_keys.clear();
    }
}

#[derive(Debug)]
pub struct FilterBlockReader {
    contents: Vec<u8>,
    start_of_offsets: usize,
    filter_base_log2: u8,
}

impl FilterBlockReader {
    pub fn new(contents: Vec<u8>) -> Result<Self> {
        if contents.len() < FOOTER_LEN {
            return Err(Error::corruption("filter block shorter than its footer"));
        }
        let len = contents.len();
        let filter_base_log2 = contents[len - 1];
        let start_of_offsets_bytes: [u8; 4] = contents[len - 5..len - 1]
            .try_into()
            .expect("exactly 4 bytes sliced");
        let start_of_offsets = u32::from_le_bytes(start_of_offsets_bytes) as usize;
        if start_of_offsets > len - FOOTER_LEN {
            return Err(Error::corruption("filter block offset-array start out of range"));
        }

        Ok(Self {
            contents,
            start_of_offsets,
            filter_base_log2,
        })
    }

    #[must_use]
    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        let filter_index = (block_offset >> self.filter_base_log2) as usize;
        if filter_index >= self.num_filters() {
            return true;
        }
        let (start, end) = self.offset_range(filter_index);
        let filter = &self.contents[start..end];
        if filter.is_empty() {
            return false;
        }
        BloomPolicy::key_may_match(key, filter)
    }

    fn num_filters(&self) -> usize {
        let offset_array_size = self.contents.len() - self.start_of_offsets - FOOTER_LEN;
        offset_array_size / U32_BYTES
    }

    fn offset_range(&self, filter_index: usize) -> (usize, usize) {
        let start_offset = self.start_of_offsets + U32_BYTES * filter_index;
        let end_offset = start_offset + U32_BYTES;
        let start = u32::from_le_bytes(
            self.contents[start_offset..start_offset + U32_BYTES]
                .try_into()
                .expect("exactly 4 bytes sliced"),
        );
        let end = u32::from_le_bytes(
            self.contents[end_offset..end_offset + U32_BYTES]
                .try_into()
                .expect("exactly 4 bytes sliced"),
        );
        (start as usize, end as usize)
    }
}
