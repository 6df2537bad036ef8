//! Learned compaction probe (C4): given a target internal key, returns the
//! global position of the greatest entry ≤ target across a file's model,
//! so a compaction merge can emit a contiguous run from that file without
//! per-key comparisons against the other inputs.
//!
//! Grounded in §4.4 and sharing [`crate::table::Table`]'s parsing primitives
//! with [`crate::learned_reader`]; the two differ exactly where Open
//! Question 3 says they must: this probe compares the full internal key
//! (user key plus the 8-byte sequence/type suffix) at the cross-block
//! boundary and during its upper-search binary search, while the file
//! reader compares only the user-key portion at the same points.
use stratum_vfs::RandomAccess;

use crate::comparator::{split_internal_key, InternalKeyComparator, TableComparator};
use crate::error::{Error, Result};
use crate::format::decode_fixed_entry;
use crate::model::LearnedModel;
use crate::table::Table;

/// Returns the global entry position of the greatest entry whose internal
/// key is `<= target_internal_key`, or `None` if `model` has no trained
/// segments (the baseline probe takes over in that case).
pub fn get_for_compaction<F: RandomAccess>(
    table: &Table<F>,
    model: &dyn LearnedModel,
    target_internal_key: &[u8],
) -> Result<Option<u64>> {
    if !model.learned() {
        return Ok(None);
    }

    let (target_user_key, _) = split_internal_key(target_internal_key)
        .ok_or_else(|| Error::corruption("internal key shorter than the sequence/type suffix"))?;

    let max_position = table.num_entries().saturating_sub(1);
    let prediction = model.predict(target_user_key)?;
    let (lower, upper) = prediction.search_window(max_position);
    if lower > max_position {
        return Ok(Some(max_position));
    }

    let layout = table.layout();
    let index_lower = layout.block_of_position(lower);
    let index_upper = layout.block_of_position(upper);

    let internal_cmp = InternalKeyComparator::new();
    let block_index = if index_lower == index_upper {
        index_lower
    } else {
        resolve_cross_block(table, index_lower, target_internal_key, &internal_cmp)?
    };

    let pos_block_lower = if block_index == index_lower {
        lower % layout.block_num_entries
    } else {
        0
    };
    let pos_block_upper = if block_index == index_upper {
        upper % layout.block_num_entries
    } else {
        table.last_position_in_block(block_index)
    };

    let entry_count = (pos_block_upper - pos_block_lower + 1) as usize;
    let mut buf = vec![0_u8; entry_count * layout.entry_size as usize];
    let read_offset = layout.block_offset(block_index) + pos_block_lower * layout.entry_size;
    table.read_raw_at(read_offset, &mut buf)?;

    let chunks: Vec<&[u8]> = buf.chunks(layout.entry_size as usize).collect();

    // Leftward error correction: the model's lower bound may overshoot past
    // the target by a few entries (an undertrained segment). Walk back
    // until the entry at `left` is `<= target`, or we hit the start of the
    // window.
    let mut left = 0_usize;
    let mut underflowed = false;
    loop {
        let entry = decode_fixed_entry(chunks[left])?;
        if internal_cmp.cmp(entry.key, target_internal_key) != std::cmp::Ordering::Greater {
            break;
        }
        if left == 0 {
            underflowed = true;
            break;
        }
        left -= 1;
    }

    // Upper-search: find the greatest index `<= target` within `[left, chunks.len() - 1]`.
    let mut lo = left;
    let mut hi = chunks.len() - 1;
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        let entry = decode_fixed_entry(chunks[mid])?;
        if internal_cmp.cmp(entry.key, target_internal_key) != std::cmp::Ordering::Greater {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    let block_global_start = layout.block_global_start(block_index);
    let mut global_position = block_global_start + pos_block_lower + lo as u64;
    if underflowed {
        global_position = global_position.saturating_sub(1);
    }

    Ok(Some(global_position))
}

/// Resolves which of two adjacent blocks holds the boundary, comparing the
/// largest *internal* key stored in `index_lower` against the target.
fn resolve_cross_block<F: RandomAccess>(
    table: &Table<F>,
    index_lower: u64,
    target_internal_key: &[u8],
    internal_cmp: &InternalKeyComparator,
) -> Result<u64> {
    let entries = table.index_block().entries();
    let (largest_key_in_lower, _) = entries
        .get(index_lower as usize)
        .ok_or_else(|| Error::corruption("predicted block index past the end of the index block"))?;

    Ok(if internal_cmp.cmp(largest_key_in_lower, target_internal_key) == std::cmp::Ordering::Less {
        index_lower + 1
    } else {
        index_lower
    })
}
