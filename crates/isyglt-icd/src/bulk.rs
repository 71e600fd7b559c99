use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

/// Largest register gap bridged when two spans are merged.
pub const BULK_GAP_THRESHOLD: u32 = 16;
/// Largest range a single read may cover.
pub const BULK_RANGE_LIMIT: u32 = 125;

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BulkRange {
    pub start: u16,
    pub count: u16,
}

/// Merge `(start, count)` spans into ranges suitable for one read each.
///
/// Spans are visited in start order. A span joins the current range when
/// the gap before it is at most [`BULK_GAP_THRESHOLD`] registers and the
/// merged range stays within [`BULK_RANGE_LIMIT`]; otherwise it opens a new
/// range. Ranges longer than the limit are left out. Empty spans are
/// ignored.
pub fn bulk_ranges(spans: &[(u16, u16)]) -> Vec<BulkRange> {
    // Inclusive (first, last) pairs, widened so the arithmetic can't wrap.
    let mut sorted: Vec<(u32, u32)> = spans
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|&(start, count)| {
            let first = u32::from(start);
            (first, first + u32::from(count) - 1)
        })
        .collect();
    sorted.sort_unstable();

    let mut ranges = Vec::new();
    let mut iter = sorted.into_iter();
    let Some((mut first, mut last)) = iter.next() else {
        return ranges;
    };

    for (start, end) in iter {
        let gap = start.saturating_sub(last + 1);
        let merged_last = last.max(end);
        if gap <= BULK_GAP_THRESHOLD
            && merged_last - first + 1 <= BULK_RANGE_LIMIT
        {
            last = merged_last;
        } else {
            push_range(&mut ranges, first, last);
            first = start;
            last = end;
        }
    }
    push_range(&mut ranges, first, last);
    ranges
}

fn push_range(ranges: &mut Vec<BulkRange>, first: u32, last: u32) {
    let count = last - first + 1;
    // Spans end inside the 16-bit address space, so `first` fits.
    if count <= BULK_RANGE_LIMIT {
        ranges.push(BulkRange { start: first as u16, count: count as u16 });
    }
}
