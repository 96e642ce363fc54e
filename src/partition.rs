//! Contiguous work partitioning for the worker pool.

use std::ops::Range;

/// A contiguous slice of a workload owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// Index of the first item in the slice.
    pub start: usize,
    /// Number of items in the slice.
    pub len: usize,
}

impl Partition {
    /// Returns the item index range covered by this partition.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// Splits `total_items` into at most `worker_count` contiguous partitions.
///
/// The first `total_items % workers` partitions get one extra item, so lengths
/// differ by at most one. When there are fewer items than workers, each item
/// gets its own partition and the surplus workers are never spawned. Zero items
/// (or zero workers) yields no partitions.
#[must_use]
pub fn partition(total_items: usize, worker_count: usize) -> Vec<Partition> {
    let workers = worker_count.min(total_items);
    if workers == 0 {
        return Vec::new();
    }

    let base = total_items / workers;
    let extra = total_items % workers;

    (0..workers)
        .map(|index| {
            if index < extra {
                Partition {
                    start: index * (base + 1),
                    len: base + 1,
                }
            } else {
                Partition {
                    start: extra * (base + 1) + (index - extra) * base,
                    len: base,
                }
            }
        })
        .collect()
}
