//! Partitioner - splits `n` viewers into contiguous per-worker ranges.
//!
//! ## Algorithm
//! 1. `base = ceil(n / p)`
//! 2. Worker `r` starts at `r * base`
//! 3. Worker `r` owns `min(base, n - r * base)` rows, or zero once
//!    `r * base >= n`
//!
//! The plan depends only on `(n, p)`, so every participant derives the same
//! ranges on its own without exchanging them.

use crate::error::{KnnError, Result};
use data_loader::ViewerId;
use serde::Serialize;
use std::ops::Range;

/// Rows owned by one worker rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerRange {
    pub rank: usize,
    pub offset: ViewerId,
    pub count: usize,
}

impl WorkerRange {
    /// Global viewer ids owned by this worker
    pub fn range(&self) -> Range<ViewerId> {
        self.offset..self.offset + self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Row ranges for every worker rank, ordered by rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionPlan {
    viewers: usize,
    ranges: Vec<WorkerRange>,
}

/// Compute the partition of `viewers` rows over `workers` ranks.
///
/// Workers past the end of the data own zero rows; their offset is clamped
/// to `viewers` so every range stays inside `[0, n]`.
pub fn plan(viewers: usize, workers: usize) -> Result<PartitionPlan> {
    if workers == 0 {
        return Err(KnnError::InvalidPartition(
            "worker count must be at least 1".to_string(),
        ));
    }

    let base = viewers.div_ceil(workers);
    let ranges = (0..workers)
        .map(|rank| {
            let start = rank.saturating_mul(base);
            if start < viewers {
                WorkerRange {
                    rank,
                    offset: start,
                    count: base.min(viewers - start),
                }
            } else {
                WorkerRange {
                    rank,
                    offset: viewers,
                    count: 0,
                }
            }
        })
        .collect();

    let plan = PartitionPlan { viewers, ranges };
    plan.validate()?;
    Ok(plan)
}

impl PartitionPlan {
    /// Total number of viewers covered
    pub fn viewers(&self) -> usize {
        self.viewers
    }

    /// Number of worker ranks (`p`)
    pub fn workers(&self) -> usize {
        self.ranges.len()
    }

    pub fn ranges(&self) -> &[WorkerRange] {
        &self.ranges
    }

    pub fn get(&self, rank: usize) -> Option<&WorkerRange> {
        self.ranges.get(rank)
    }

    /// Check that ranges are in rank order, contiguous, and sum to `n`
    pub fn validate(&self) -> Result<()> {
        let mut next = 0;
        for (idx, range) in self.ranges.iter().enumerate() {
            if range.rank != idx {
                return Err(KnnError::InvalidPartition(format!(
                    "range at position {} is labelled rank {}",
                    idx, range.rank
                )));
            }
            if range.count > 0 && range.offset != next {
                return Err(KnnError::InvalidPartition(format!(
                    "worker {} starts at {} but the previous range ends at {}",
                    idx, range.offset, next
                )));
            }
            next += range.count;
        }
        if next != self.viewers {
            return Err(KnnError::InvalidPartition(format!(
                "counts sum to {} but there are {} viewers",
                next, self.viewers
            )));
        }
        Ok(())
    }
}
