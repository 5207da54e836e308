//! Controller - drives one prediction run end to end.
//!
//! ## Pipeline
//! 1. Validate shape, query length and `k`
//! 2. Broadcast `n`, `m` and the query to every worker
//! 3. Partition `[0, n)` and scatter each worker its rows
//! 4. Gather per-worker distances and rebuild viewer order
//! 5. Rank and keep the k nearest
//! 6. Average their target ratings
//!
//! Steps 1, 3 (slicing), 4 (reassembly) and 5-6 are exposed as free functions
//! so other substrates (the async pool in the server crate) run exactly the
//! same logic around their own transport.

use crate::aggregate;
use crate::cluster::Collective;
use crate::error::{KnnError, Result};
use crate::partition::{self, PartitionPlan};
use crate::rank;
use crate::types::{
    Broadcast, DistanceRecord, Neighbor, PredictionReport, RowSlice, WorkerDistances,
};
use data_loader::{QueryVector, RatingMatrix};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Check the inputs and build the broadcast payload.
///
/// `k` is checked here as well so a bad value aborts before any worker is
/// involved.
pub fn prepare(matrix: &RatingMatrix, query: &QueryVector, k: usize) -> Result<Arc<Broadcast>> {
    if query.len() != matrix.comparison_items() {
        return Err(KnnError::InvalidDimensions(format!(
            "query has {} ratings but the matrix has {} comparison items",
            query.len(),
            matrix.comparison_items()
        )));
    }
    if k == 0 {
        return Err(KnnError::InvalidK { k });
    }
    if k > matrix.viewers() {
        return Err(KnnError::KExceedsPopulation {
            k,
            n: matrix.viewers(),
        });
    }
    Ok(Arc::new(Broadcast {
        viewers: matrix.viewers(),
        items: matrix.items(),
        query: Arc::from(query.as_slice()),
    }))
}

/// Cut the matrix into one owned slice per worker, following `plan`
pub fn split_rows(matrix: &RatingMatrix, plan: &PartitionPlan) -> Result<Vec<RowSlice>> {
    plan.ranges()
        .iter()
        .map(|range| {
            let rows = matrix.rows(range.range()).ok_or_else(|| {
                KnnError::InvalidPartition(format!(
                    "worker {} range {:?} exceeds {} viewers",
                    range.rank,
                    range.range(),
                    matrix.viewers()
                ))
            })?;
            Ok(RowSlice::new(range.offset, matrix.items(), rows.to_vec()))
        })
        .collect()
}

/// Reassemble gathered distances, rank them and average the k nearest
pub fn finish(
    matrix: &RatingMatrix,
    plan: &PartitionPlan,
    contributions: Vec<WorkerDistances>,
    k: usize,
) -> Result<PredictionReport> {
    let records = aggregate::gather(contributions, plan)?;
    let nearest = rank::top_k(records, k)?;
    report(matrix, &nearest)
}

/// Attach target ratings to ranked records and compute their mean
pub fn report(matrix: &RatingMatrix, nearest: &[DistanceRecord]) -> Result<PredictionReport> {
    let neighbors = nearest
        .iter()
        .map(|record| {
            let target_rating = matrix.target_rating(record.viewer_id).ok_or_else(|| {
                KnnError::InvalidDimensions(format!(
                    "viewer {} is outside the {}-viewer matrix",
                    record.viewer_id,
                    matrix.viewers()
                ))
            })?;
            Ok(Neighbor {
                viewer_id: record.viewer_id,
                distance: record.distance,
                target_rating,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if neighbors.is_empty() {
        return Err(KnnError::InvalidDimensions("no neighbors to average".to_string()));
    }
    let total: f64 = neighbors.iter().map(|n| n.target_rating).sum();
    let prediction = total / neighbors.len() as f64;

    Ok(PredictionReport {
        neighbors,
        prediction,
    })
}

/// Run one prediction over the given collective substrate
#[instrument(
    skip_all,
    fields(viewers = matrix.viewers(), items = matrix.items(), workers = cluster.size(), k = k)
)]
pub fn predict<C: Collective>(
    cluster: &mut C,
    matrix: &RatingMatrix,
    query: &QueryVector,
    k: usize,
) -> Result<PredictionReport> {
    let payload = prepare(matrix, query, k)?;

    cluster.broadcast(Arc::clone(&payload))?;
    debug!("Broadcast shape {}x{} and query", payload.viewers, payload.items);

    let plan = partition::plan(payload.viewers, cluster.size())?;
    cluster.scatter(split_rows(matrix, &plan)?)?;
    debug!("Scattered rows to {} workers", plan.workers());

    let contributions = cluster.gather()?;
    let report = finish(matrix, &plan, contributions, k)?;

    info!(
        "Predicted {:.3} from {} nearest viewers",
        report.prediction,
        report.neighbors.len()
    );
    Ok(report)
}
