//! Aggregator - rebuilds the global distance sequence on the coordinator.
//!
//! Contributions may arrive in any order. Each one is slotted by its rank,
//! and because the plan's ranges are contiguous and ordered by rank,
//! concatenating the slots in rank order yields viewer order `0..n` without
//! sorting by viewer id.

use crate::error::{KnnError, Phase, Result};
use crate::partition::PartitionPlan;
use crate::types::{DistanceRecord, WorkerDistances};
use tracing::debug;

/// Gather every worker's distances into one sequence indexed by viewer id.
///
/// Fails with `CollectiveFailure` if a rank is missing, duplicated, unknown,
/// or contributed a block that does not match its plan entry.
pub fn gather(
    contributions: Vec<WorkerDistances>,
    plan: &PartitionPlan,
) -> Result<Vec<DistanceRecord>> {
    let mut slots: Vec<Option<WorkerDistances>> = vec![None; plan.workers()];

    for contribution in contributions {
        let rank = contribution.rank;
        let expected = plan.get(rank).ok_or_else(|| {
            KnnError::collective(
                Phase::Gather,
                rank,
                format!("rank outside a {}-worker plan", plan.workers()),
            )
        })?;
        if contribution.offset != expected.offset || contribution.distances.len() != expected.count
        {
            return Err(KnnError::collective(
                Phase::Gather,
                rank,
                format!(
                    "sent {} values at offset {}, plan expects {} at offset {}",
                    contribution.distances.len(),
                    contribution.offset,
                    expected.count,
                    expected.offset
                ),
            ));
        }
        let slot = &mut slots[rank];
        if slot.is_some() {
            return Err(KnnError::collective(
                Phase::Gather,
                rank,
                "contributed more than once",
            ));
        }
        *slot = Some(contribution);
    }

    let mut records = Vec::with_capacity(plan.viewers());
    for (rank, slot) in slots.into_iter().enumerate() {
        let contribution = slot.ok_or_else(|| {
            KnnError::collective(Phase::Gather, rank, "no contribution received")
        })?;
        records.extend(
            contribution
                .distances
                .into_iter()
                .enumerate()
                .map(|(i, distance)| DistanceRecord {
                    viewer_id: contribution.offset + i,
                    distance,
                }),
        );
    }

    debug!(
        "Gathered {} distances from {} workers",
        records.len(),
        plan.workers()
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::plan;

    fn contribution(rank: usize, offset: usize, distances: Vec<f64>) -> WorkerDistances {
        WorkerDistances {
            rank,
            offset,
            distances,
        }
    }

    #[test]
    fn test_gather_restores_viewer_order_regardless_of_arrival() {
        let plan = plan(5, 3).unwrap(); // 2, 2, 1
        let arrivals = vec![
            contribution(2, 4, vec![40.0]),
            contribution(0, 0, vec![0.0, 10.0]),
            contribution(1, 2, vec![20.0, 30.0]),
        ];

        let records = gather(arrivals, &plan).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.viewer_id).collect();
        let distances: Vec<_> = records.iter().map(|r| r.distance).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(distances, vec![0.0, 10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_empty_workers_contribute_nothing() {
        let plan = plan(2, 4).unwrap(); // 1, 1, 0, 0
        let arrivals = vec![
            contribution(3, 2, vec![]),
            contribution(1, 1, vec![7.0]),
            contribution(2, 2, vec![]),
            contribution(0, 0, vec![3.0]),
        ];
        let records = gather(arrivals, &plan).unwrap();
        assert_eq!(
            records,
            vec![
                DistanceRecord {
                    viewer_id: 0,
                    distance: 3.0,
                },
                DistanceRecord {
                    viewer_id: 1,
                    distance: 7.0,
                },
            ]
        );
    }

    #[test]
    fn test_missing_worker_is_collective_failure() {
        let plan = plan(4, 2).unwrap();
        let result = gather(vec![contribution(0, 0, vec![1.0, 2.0])], &plan);
        assert!(matches!(
            result,
            Err(KnnError::CollectiveFailure { phase: Phase::Gather, rank: 1, .. })
        ));
    }

    #[test]
    fn test_wrong_count_is_rejected() {
        let plan = plan(4, 2).unwrap();
        let result = gather(
            vec![
                contribution(0, 0, vec![1.0]),
                contribution(1, 2, vec![3.0, 4.0]),
            ],
            &plan,
        );
        assert!(matches!(
            result,
            Err(KnnError::CollectiveFailure { rank: 0, .. })
        ));
    }

    #[test]
    fn test_duplicate_and_unknown_rank_rejected() {
        let plan = plan(2, 1).unwrap();
        let duplicate = gather(
            vec![
                contribution(0, 0, vec![1.0, 2.0]),
                contribution(0, 0, vec![1.0, 2.0]),
            ],
            &plan,
        );
        assert!(matches!(duplicate, Err(KnnError::CollectiveFailure { .. })));

        let unknown = gather(vec![contribution(5, 0, vec![])], &plan);
        assert!(matches!(
            unknown,
            Err(KnnError::CollectiveFailure { rank: 5, .. })
        ));
    }
}
