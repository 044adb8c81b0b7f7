use std::ops::Range;

/// Byte range of one chunk within the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// 1-based chunk index (`sliceNo` on the wire).
    pub index: u32,
    /// Half-open byte range `[start, end)`.
    pub range: Range<u64>,
}

impl ChunkPlan {
    /// Length of the chunk in bytes.
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Number of chunks needed for `file_size` bytes in slices of `slice_size`.
///
/// Returns 0 for an empty file or a zero slice size, and `None` when the
/// count does not fit a `u32` chunk index.
pub fn total_chunks(file_size: u64, slice_size: u64) -> Option<u32> {
    if file_size == 0 || slice_size == 0 {
        return Some(0);
    }
    u32::try_from(file_size.div_ceil(slice_size)).ok()
}

/// Splits `file_size` bytes into consecutive slices of `slice_size`.
///
/// Only the last chunk may be shorter. Pure: same inputs, same plan.
/// `None` when the slices would outnumber the `u32` index space.
pub fn plan_chunks(file_size: u64, slice_size: u64) -> Option<Vec<ChunkPlan>> {
    let total = total_chunks(file_size, slice_size)?;
    let plan = (1..=total)
        .map(|index| {
            let start = u64::from(index - 1) * slice_size;
            let end = (start + slice_size).min(file_size);
            ChunkPlan {
                index,
                range: start..end,
            }
        })
        .collect();
    Some(plan)
}
