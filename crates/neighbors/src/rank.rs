//! Ranker - selects the k nearest viewers.
//!
//! Records are ordered by ascending distance, then by ascending viewer id.
//! The viewer-id tie-break makes the order total, so the result is the same
//! for any worker count and any input permutation.

use crate::error::{KnnError, Result};
use crate::types::DistanceRecord;
use std::cmp::Ordering;

/// Total order used for ranking: distance first, then viewer id
pub fn compare(a: &DistanceRecord, b: &DistanceRecord) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.viewer_id.cmp(&b.viewer_id))
}

/// Return the `k` nearest records, nearest first.
///
/// Fails with `InvalidK` when `k == 0` and with `KExceedsPopulation` when
/// `k` is larger than the number of records. A short result is never
/// returned silently.
pub fn top_k(mut records: Vec<DistanceRecord>, k: usize) -> Result<Vec<DistanceRecord>> {
    if k == 0 {
        return Err(KnnError::InvalidK { k });
    }
    if k > records.len() {
        return Err(KnnError::KExceedsPopulation {
            k,
            n: records.len(),
        });
    }

    if k < records.len() {
        // Partition around the k-th element, then order only the head
        records.select_nth_unstable_by(k - 1, compare);
        records.truncate(k);
    }
    records.sort_unstable_by(compare);
    Ok(records)
}
