//! Division planning for parallel compression.

use serde::{Deserialize, Serialize};

use crate::engine::types::PositionIndex;

/// Default division size in bytes
pub const DEFAULT_BLOCKSIZE: u64 = 100_000_000;

/// A contiguous run of spectra compressed as one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Division {
    /// First spectrum ordinal
    pub first_spectrum: usize,
    /// One past the last spectrum ordinal
    pub end_spectrum: usize,
    /// Byte offset of the first spectrum element
    pub start: u64,
    /// Byte offset just past the last spectrum element
    pub end: u64,
}

impl Division {
    /// Number of spectra in the division
    pub fn len(&self) -> usize {
        self.end_spectrum - self.first_spectrum
    }

    /// Whether the division holds no spectra
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.end - self.start
    }
}

/// Partition plan handed from `prepare` to `compress`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionPlan {
    /// Effective division size after adjusting for the thread count
    pub blocksize: u64,
    /// Thread count the plan was made for
    pub thread_count: usize,
    /// Divisions in file order
    pub divisions: Vec<Division>,
}

/// Split the spectra into contiguous divisions.
///
/// Divisions hold at most `blocksize` bytes of spectrum elements unless a
/// single spectrum is larger. Small files get a reduced block size so
/// there is work for every thread.
pub fn plan_divisions(
    positions: &PositionIndex,
    blocksize: u64,
    thread_count: usize,
) -> DivisionPlan {
    let threads = thread_count.max(1);
    let xml = &positions.xml;
    let count = xml.len();

    let total: u64 = (0..count)
        .filter_map(|i| xml.range(i))
        .map(|(start, end)| end - start)
        .sum();
    let mut block = blocksize.max(1);
    if total / (block * threads as u64) < 1 {
        block = (total / threads as u64 + 1).min(block);
    }

    let mut divisions = Vec::new();
    let mut first = 0usize;
    let mut current = 0u64;
    for ordinal in 0..count {
        let Some((start, end)) = xml.range(ordinal) else {
            continue;
        };
        let size = end - start;
        if ordinal > first && current + size > block {
            divisions.push(division(positions, first, ordinal));
            first = ordinal;
            current = 0;
        }
        current += size;
    }
    if first < count {
        divisions.push(division(positions, first, count));
    }

    DivisionPlan {
        blocksize: block,
        thread_count: threads,
        divisions,
    }
}

fn division(positions: &PositionIndex, first: usize, end: usize) -> Division {
    let start = positions.xml.start_positions.get(first).copied().unwrap_or(0);
    let stop = end
        .checked_sub(1)
        .and_then(|last| positions.xml.end_positions.get(last).copied())
        .unwrap_or(start);
    Division {
        first_spectrum: first,
        end_spectrum: end,
        start,
        end: stop,
    }
}
