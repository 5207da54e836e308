//! # Prediction Orchestrator
//!
//! Coordinates one prediction over the worker pool:
//! 1. Validate the request and build the broadcast payload
//! 2. Broadcast shape and query to every worker task
//! 3. Partition the viewers and scatter each worker its rows
//! 4. Gather distances (in whatever order workers finish)
//! 5. Rebuild viewer order, rank, and average the k nearest
//!
//! The validation, slicing and reassembly steps are the same functions the
//! sequential controller uses; only the transport differs.

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use data_loader::{QueryVector, RatingMatrix};
use neighbors::{controller, partition, PredictionReport};

use crate::pool::WorkerPool;

/// Drives predictions over a fixed pool of worker tasks
pub struct PredictionOrchestrator {
    pool: WorkerPool,
}

impl PredictionOrchestrator {
    /// Start `workers` worker tasks on the current runtime
    pub fn new(workers: usize) -> Result<Self> {
        let pool = WorkerPool::spawn(workers).context("Failed to start worker pool")?;
        info!("Started worker pool with {} workers", workers);
        Ok(Self { pool })
    }

    /// Number of workers (`p`)
    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// Predict the target rating for `query` from its `k` nearest viewers.
    ///
    /// Takes `&mut self` so two runs never interleave their messages on the
    /// same workers.
    #[instrument(
        skip_all,
        fields(
            viewers = matrix.viewers(),
            items = matrix.items(),
            workers = self.pool.size(),
            k = k
        )
    )]
    pub async fn predict(
        &mut self,
        matrix: &RatingMatrix,
        query: &QueryVector,
        k: usize,
    ) -> Result<PredictionReport> {
        let start_time = Instant::now();

        let payload = controller::prepare(matrix, query, k).context("Rejected prediction request")?;

        self.pool
            .broadcast(payload.clone())
            .await
            .context("Broadcast of shape and query failed")?;
        debug!("Broadcast shape {}x{} and query", payload.viewers, payload.items);

        let plan = partition::plan(payload.viewers, self.pool.size())
            .context("Failed to partition viewers")?;
        let slices = controller::split_rows(matrix, &plan).context("Failed to slice matrix")?;
        self.pool
            .scatter(slices)
            .await
            .context("Scatter of matrix rows failed")?;
        debug!("Scattered rows to {} workers", plan.workers());

        let contributions = self
            .pool
            .gather()
            .await
            .context("Gather of distances failed")?;

        let report = controller::finish(matrix, &plan, contributions, k)
            .context("Failed to rank gathered distances")?;

        info!(
            "Predicted {:.3} from {} nearest viewers in {:.2?}",
            report.prediction,
            report.neighbors.len(),
            start_time.elapsed()
        );
        Ok(report)
    }

    /// Stop every worker task
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }

    #[cfg(test)]
    pub(crate) fn pool_mut(&mut self) -> &mut WorkerPool {
        &mut self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neighbors::{predict_local, KnnError, Phase};

    // ============================================================================
    // Test Fixtures
    // ============================================================================

    fn scenario() -> (RatingMatrix, QueryVector) {
        let matrix = RatingMatrix::from_rows(&[
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![2.0, 2.0, 2.0, 2.0, 2.0],
            vec![1.0, 2.0, 3.0, 4.0, 1.0],
            vec![5.0, 4.0, 3.0, 2.0, 5.0],
        ])
        .unwrap();
        (matrix, QueryVector::new(vec![1.0, 2.0, 3.0, 4.0]))
    }

    fn larger_matrix() -> RatingMatrix {
        let rows: Vec<Vec<f64>> = (0..37)
            .map(|i| (0..6).map(|j| (((i * 7 + j * 3) % 10) + 1) as f64 * 0.5).collect())
            .collect();
        RatingMatrix::from_rows(&rows).unwrap()
    }

    // ============================================================================
    // Pipeline
    // ============================================================================

    #[tokio::test]
    async fn test_predict_scenario() {
        let (matrix, query) = scenario();
        let mut orchestrator = PredictionOrchestrator::new(3).unwrap();

        let report = orchestrator.predict(&matrix, &query, 2).await.unwrap();
        let ids: Vec<_> = report.neighbors.iter().map(|n| n.viewer_id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!(report.prediction, 3.0);

        orchestrator.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_matches_sequential_substrate() {
        let matrix = larger_matrix();
        let query = QueryVector::new(vec![2.5, 4.0, 1.0, 3.5, 5.0]);
        let n = matrix.viewers();

        for workers in [1, 2, n, n + 5] {
            let mut orchestrator = PredictionOrchestrator::new(workers).unwrap();
            for k in [1, 5, n] {
                let pooled = orchestrator.predict(&matrix, &query, k).await.unwrap();
                let local = predict_local(&matrix, &query, workers, k).unwrap();
                assert_eq!(pooled, local, "workers = {}, k = {}", workers, k);
            }
            orchestrator.shutdown().await;
        }
    }

    #[tokio::test]
    async fn test_pool_reused_across_runs() {
        let (matrix, query) = scenario();
        let mut orchestrator = PredictionOrchestrator::new(2).unwrap();

        let first = orchestrator.predict(&matrix, &query, 1).await.unwrap();
        let second = orchestrator
            .predict(&matrix, &QueryVector::new(vec![2.0, 2.0, 2.0, 2.0]), 1)
            .await
            .unwrap();
        assert_eq!(first.neighbors[0].viewer_id, 0);
        assert_eq!(second.neighbors[0].viewer_id, 1);
        assert_eq!(second.prediction, 2.0);

        orchestrator.shutdown().await;
    }

    // ============================================================================
    // Failures
    // ============================================================================

    #[tokio::test]
    async fn test_invalid_k_is_typed_error() {
        let (matrix, query) = scenario();
        let mut orchestrator = PredictionOrchestrator::new(2).unwrap();

        let err = orchestrator.predict(&matrix, &query, 0).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KnnError>(),
            Some(KnnError::InvalidK { k: 0 })
        ));

        let err = orchestrator.predict(&matrix, &query, 9).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KnnError>(),
            Some(KnnError::KExceedsPopulation { k: 9, n: 4 })
        ));

        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        assert!(PredictionOrchestrator::new(0).is_err());
    }

    #[tokio::test]
    async fn test_crashed_worker_aborts_run() {
        let (matrix, query) = scenario();
        let mut orchestrator = PredictionOrchestrator::new(3).unwrap();
        orchestrator.pool_mut().stop_worker(2).await;

        let err = orchestrator.predict(&matrix, &query, 2).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KnnError>(),
            Some(KnnError::CollectiveFailure { phase: Phase::Broadcast, rank: 2, .. })
        ));
        assert!(format!("{:#}", err).contains("Broadcast"));

        orchestrator.shutdown().await;
    }
}
