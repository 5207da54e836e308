//! Collective operations over a fixed group of workers.
//!
//! [`Collective`] is the seam between the controller and the substrate that
//! carries messages to workers. Each call is a barrier: it returns only after
//! every worker has taken part, or fails with `CollectiveFailure` naming the
//! first worker that did not.
//!
//! [`LocalCluster`] runs every worker in the calling thread, one after the
//! other. It is the reference substrate for tests and single-process runs.

use crate::error::{KnnError, Phase, Result};
use crate::types::{Broadcast, RowSlice, WorkerDistances};
use crate::worker::Worker;
use std::sync::Arc;

/// Broadcast, scatter and gather over `size()` workers
pub trait Collective {
    /// Number of workers (`p`)
    fn size(&self) -> usize;

    /// Replicate shape and query to every worker
    fn broadcast(&mut self, payload: Arc<Broadcast>) -> Result<()>;

    /// Hand `slices[r]` to worker `r`. `slices.len()` must equal `size()`.
    fn scatter(&mut self, slices: Vec<RowSlice>) -> Result<()>;

    /// Have every worker compute its distances and collect the results.
    ///
    /// The returned contributions may be in any order.
    fn gather(&mut self) -> Result<Vec<WorkerDistances>>;
}

/// All workers in one thread, run sequentially
#[derive(Debug, Clone)]
pub struct LocalCluster {
    workers: Vec<Worker>,
}

impl LocalCluster {
    /// Create a group of `size` workers
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(KnnError::InvalidPartition(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            workers: (0..size).map(|rank| Worker::new(rank, size)).collect(),
        })
    }
}

impl Collective for LocalCluster {
    fn size(&self) -> usize {
        self.workers.len()
    }

    fn broadcast(&mut self, payload: Arc<Broadcast>) -> Result<()> {
        for worker in &mut self.workers {
            worker.receive_broadcast(Arc::clone(&payload))?;
        }
        Ok(())
    }

    fn scatter(&mut self, slices: Vec<RowSlice>) -> Result<()> {
        if slices.len() != self.workers.len() {
            return Err(KnnError::collective(
                Phase::Scatter,
                slices.len().min(self.workers.len()),
                format!(
                    "{} slices for {} workers",
                    slices.len(),
                    self.workers.len()
                ),
            ));
        }
        for (worker, slice) in self.workers.iter_mut().zip(slices) {
            worker.receive_slice(slice)?;
        }
        Ok(())
    }

    fn gather(&mut self) -> Result<Vec<WorkerDistances>> {
        self.workers.iter().map(Worker::compute).collect()
    }
}
