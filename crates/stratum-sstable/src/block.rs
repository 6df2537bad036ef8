//! The general (shared-prefix, restart-point) block format used for the
//! index and metaindex blocks.
//!
//! Grounded in the teacher's `block` module layout, but simplified: rather
//! than a lending iterator over the raw bytes, an [`IndexBlock`] decodes all
//! of its entries once at table-open time into an in-memory sorted vector.
//! Index and metaindex blocks are small (one entry per data block, one entry
//! per filter), so this trades a little memory for a much smaller
//! implementation than a zero-copy restart-point iterator, and it gives a
//! plain binary search for [`IndexBlock::seek`] instead of restart-interval
//! bisection.
use integer_encoding::VarInt;

use crate::comparator::TableComparator;
use crate::error::{Error, Result};

/// A decoded, fully-materialized block: sorted `(key, value)` pairs.
#[derive(Debug, Clone)]
pub struct IndexBlock {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl IndexBlock {
    /// Decodes every entry in `contents`, up to the restart-point array at
    /// the tail (which this reader never needs, since it always decodes the
    /// whole block up front).
    pub fn decode(contents: &[u8]) -> Result<Self> {
        if contents.len() < 4 {
            return Err(Error::corruption("block shorter than its restart-count field"));
        }
        let num_restarts = u32::from_le_bytes(
            contents[contents.len() - 4..]
                .try_into()
                .expect("exactly 4 bytes sliced"),
        ) as usize;

        let restart_array_len = 4 + num_restarts * 4;
        let entries_len = contents
            .len()
            .checked_sub(restart_array_len)
            .ok_or_else(|| Error::corruption("block restart array longer than the block"))?;
        let mut rest = &contents[..entries_len];

        let mut entries = Vec::new();
        let mut last_key: Vec<u8> = Vec::new();

        while !rest.is_empty() {
            let (shared, n) = u32::decode_var(rest)
                .ok_or_else(|| Error::corruption("truncated block entry: shared length"))?;
            rest = &rest[n..];
            let (non_shared, n) = u32::decode_var(rest)
                .ok_or_else(|| Error::corruption("truncated block entry: key length"))?;
            rest = &rest[n..];
            let (value_len, n) = u32::decode_var(rest)
                .ok_or_else(|| Error::corruption("truncated block entry: value length"))?;
            rest = &rest[n..];

            let shared = shared as usize;
            let non_shared = non_shared as usize;
            let value_len = value_len as usize;

            if shared > last_key.len() {
                return Err(Error::corruption("block entry shares more bytes than the previous key had"));
            }
            let key_tail = rest
                .get(..non_shared)
                .ok_or_else(|| Error::corruption("truncated block entry: key bytes"))?;
            let value = rest
                .get(non_shared..non_shared + value_len)
                .ok_or_else(|| Error::corruption("truncated block entry: value bytes"))?;

            let mut key = last_key[..shared].to_vec();
            key.extend_from_slice(key_tail);

            entries.push((key.clone(), value.to_vec()));
            last_key = key;
            rest = &rest[non_shared + value_len..];
        }

        Ok(Self { entries })
    }

    /// Returns the value of the first entry whose key compares greater than
    /// or equal to `target` under `cmp`, i.e. the standard index-block
    /// lookup: the handle of the first data block that could contain
    /// `target`.
    #[must_use]
    pub fn seek(&self, target: &[u8], cmp: &impl TableComparator) -> Option<&[u8]> {
        let idx = self.entries.partition_point(|(key, _)| cmp.cmp(key, target) == std::cmp::Ordering::Less);
        self.entries.get(idx).map(|(_, value)| value.as_slice())
    }

    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::LexicographicComparator;

    fn encode_block(entries: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in entries {
            out.extend_from_slice(&0_u32.encode_var_vec());
            out.extend_from_slice(&(key.len() as u32).encode_var_vec());
            out.extend_from_slice(&(value.len() as u32).encode_var_vec());
            out.extend_from_slice(key);
            out.extend_from_slice(value);
        }
        // One restart at the start of the block, no shared prefixes.
        out.extend_from_slice(&0_u32.to_le_bytes());
        out.extend_from_slice(&1_u32.to_le_bytes());
        out
    }

    #[test]
    fn decodes_and_seeks() {
        let raw = encode_block(&[(b"apple", b"1"), (b"banana", b"2"), (b"cherry", b"3")]);
        let block = IndexBlock::decode(&raw).unwrap();
        assert_eq!(block.len(), 3);

        let cmp = LexicographicComparator;
        assert_eq!(block.seek(b"banana", &cmp), Some(b"2".as_slice()));
        assert_eq!(block.seek(b"avocado", &cmp), Some(b"2".as_slice()));
        assert_eq!(block.seek(b"zebra", &cmp), None);
    }
}
