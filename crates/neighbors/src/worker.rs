//! A single worker rank.
//!
//! A worker moves through three steps per run: it receives the broadcast
//! shape and query (and derives its own row range from them), receives its
//! row slice, and computes distances for that slice. The type knows nothing
//! about how messages reach it, so the same worker runs under the sequential
//! [`LocalCluster`](crate::cluster::LocalCluster) and under a threaded pool.

use crate::distance;
use crate::error::{KnnError, Phase, Result};
use crate::partition::{self, WorkerRange};
use crate::types::{Broadcast, RowSlice, WorkerDistances};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct Worker {
    rank: usize,
    size: usize,
    broadcast: Option<Arc<Broadcast>>,
    range: Option<WorkerRange>,
    slice: Option<Arc<RowSlice>>,
}

impl Worker {
    /// Create worker `rank` of a `size`-worker group
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            broadcast: None,
            range: None,
            slice: None,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Row range derived from the last broadcast
    pub fn range(&self) -> Option<WorkerRange> {
        self.range
    }

    /// Accept the shape and query for a new run.
    ///
    /// The worker computes the partition plan itself from `n` and the group
    /// size; any slice from a previous run is dropped.
    pub fn receive_broadcast(&mut self, payload: Arc<Broadcast>) -> Result<()> {
        let plan = partition::plan(payload.viewers, self.size)?;
        let range = plan.get(self.rank).copied().ok_or_else(|| {
            KnnError::InvalidPartition(format!(
                "rank {} is outside a {}-worker group",
                self.rank, self.size
            ))
        })?;
        debug!(
            rank = self.rank,
            "Received broadcast, owning viewers {:?}",
            range.range()
        );
        self.range = Some(range);
        self.broadcast = Some(payload);
        self.slice = None;
        Ok(())
    }

    /// Accept this worker's rows. The slice must match the derived range.
    pub fn receive_slice(&mut self, slice: RowSlice) -> Result<()> {
        let (broadcast, range) = self.run_state(Phase::Scatter)?;
        let expected_len = range.count * broadcast.items;
        if slice.items != broadcast.items
            || slice.offset != range.offset
            || slice.values.len() != expected_len
        {
            return Err(KnnError::collective(
                Phase::Scatter,
                self.rank,
                format!(
                    "slice at offset {} with {} values of width {} does not match range {:?} of width {}",
                    slice.offset,
                    slice.values.len(),
                    slice.items,
                    range.range(),
                    broadcast.items
                ),
            ));
        }
        self.slice = Some(Arc::new(slice));
        Ok(())
    }

    /// Compute the distance of every owned viewer to the query
    #[instrument(skip(self), fields(rank = self.rank))]
    pub fn compute(&self) -> Result<WorkerDistances> {
        let (broadcast, range) = self.run_state(Phase::Compute)?;
        let slice = self.slice.as_ref().ok_or_else(|| {
            KnnError::collective(Phase::Compute, self.rank, "no slice received")
        })?;

        let distances = distance::distances(&slice.values, slice.items, &broadcast.query);
        debug!("Computed {} distances", distances.len());

        Ok(WorkerDistances {
            rank: self.rank,
            offset: range.offset,
            distances,
        })
    }

    fn run_state(&self, phase: Phase) -> Result<(&Broadcast, WorkerRange)> {
        match (&self.broadcast, self.range) {
            (Some(broadcast), Some(range)) => Ok((&**broadcast, range)),
            _ => Err(KnnError::collective(
                phase,
                self.rank,
                "no broadcast received",
            )),
        }
    }
}
