//! # Worker Pool
//!
//! Runs each worker rank as its own tokio task with an `mpsc` inbox. The
//! coordinator drives the three collective steps over these channels:
//!
//! - **broadcast** / **scatter**: one message per worker, each answered on a
//!   `oneshot` ack. The step completes once every ack has arrived.
//! - **gather**: every worker gets a compute request carrying a clone of one
//!   shared reply channel. Replies arrive in completion order; the
//!   Aggregator puts them back in viewer order.
//!
//! Distance computation is CPU-bound, so a worker runs it under
//! `spawn_blocking` and keeps its async task free.
//!
//! A worker whose task has ended surfaces as `CollectiveFailure`. A worker
//! that is alive but never answers blocks the step forever; there is no
//! timeout.

use std::sync::Arc;

use neighbors::{Broadcast, KnnError, Phase, Result, RowSlice, Worker, WorkerDistances};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Messages a worker task understands
enum WorkerMessage {
    Broadcast {
        payload: Arc<Broadcast>,
        ack: oneshot::Sender<Result<()>>,
    },
    Scatter {
        slice: RowSlice,
        ack: oneshot::Sender<Result<()>>,
    },
    Compute {
        reply: mpsc::Sender<Result<WorkerDistances>>,
    },
}

/// Fixed group of worker tasks
pub struct WorkerPool {
    inboxes: Vec<mpsc::Sender<WorkerMessage>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `size` worker tasks on the current tokio runtime.
    ///
    /// Must be called from within a runtime.
    pub fn spawn(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(KnnError::InvalidPartition(
                "worker count must be at least 1".to_string(),
            ));
        }

        let mut inboxes = Vec::with_capacity(size);
        let mut handles = Vec::with_capacity(size);
        for rank in 0..size {
            // Each step sends one message per worker, so a small buffer suffices
            let (tx, rx) = mpsc::channel(4);
            inboxes.push(tx);
            handles.push(tokio::spawn(run_worker(Worker::new(rank, size), rx)));
        }
        debug!("Spawned {} worker tasks", size);

        Ok(Self { inboxes, handles })
    }

    /// Number of workers (`p`)
    pub fn size(&self) -> usize {
        self.inboxes.len()
    }

    /// Replicate shape and query to every worker and wait for all acks
    pub async fn broadcast(&self, payload: Arc<Broadcast>) -> Result<()> {
        let mut acks = Vec::with_capacity(self.size());
        for (rank, inbox) in self.inboxes.iter().enumerate() {
            let (ack, rx) = oneshot::channel();
            let message = WorkerMessage::Broadcast {
                payload: Arc::clone(&payload),
                ack,
            };
            inbox
                .send(message)
                .await
                .map_err(|_| KnnError::collective(Phase::Broadcast, rank, "worker inbox closed"))?;
            acks.push((rank, rx));
        }
        await_acks(Phase::Broadcast, acks).await
    }

    /// Send `slices[r]` to worker `r` and wait for all acks
    pub async fn scatter(&self, slices: Vec<RowSlice>) -> Result<()> {
        if slices.len() != self.size() {
            return Err(KnnError::collective(
                Phase::Scatter,
                slices.len().min(self.size()),
                format!("{} slices for {} workers", slices.len(), self.size()),
            ));
        }

        let mut acks = Vec::with_capacity(self.size());
        for (rank, (inbox, slice)) in self.inboxes.iter().zip(slices).enumerate() {
            let (ack, rx) = oneshot::channel();
            inbox
                .send(WorkerMessage::Scatter { slice, ack })
                .await
                .map_err(|_| KnnError::collective(Phase::Scatter, rank, "worker inbox closed"))?;
            acks.push((rank, rx));
        }
        await_acks(Phase::Scatter, acks).await
    }

    /// Ask every worker to compute and collect all contributions.
    ///
    /// The result is in arrival order, not rank order.
    pub async fn gather(&self) -> Result<Vec<WorkerDistances>> {
        let size = self.size();
        let (reply, mut results) = mpsc::channel(size);
        for (rank, inbox) in self.inboxes.iter().enumerate() {
            inbox
                .send(WorkerMessage::Compute {
                    reply: reply.clone(),
                })
                .await
                .map_err(|_| KnnError::collective(Phase::Compute, rank, "worker inbox closed"))?;
        }
        // Only workers hold senders now; the channel closes if they all drop theirs
        drop(reply);

        let mut contributions: Vec<WorkerDistances> = Vec::with_capacity(size);
        while contributions.len() < size {
            match results.recv().await {
                Some(result) => contributions.push(result?),
                None => {
                    let missing = (0..size)
                        .find(|rank| !contributions.iter().any(|c| c.rank == *rank))
                        .unwrap_or(size);
                    return Err(KnnError::collective(
                        Phase::Gather,
                        missing,
                        "worker exited before contributing",
                    ));
                }
            }
        }
        debug!("Gathered contributions from {} workers", size);
        Ok(contributions)
    }

    /// Close every inbox and wait for the worker tasks to finish
    pub async fn shutdown(self) {
        let Self { inboxes, handles } = self;
        drop(inboxes);
        for (rank, handle) in handles.into_iter().enumerate() {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!("Worker {} ended abnormally: {}", rank, err);
                }
            }
        }
    }

    /// Stop one worker task, as if its process had crashed
    #[cfg(test)]
    pub(crate) async fn stop_worker(&mut self, rank: usize) {
        self.handles[rank].abort();
        // The inbox closes once the aborted task has been dropped
        self.inboxes[rank].closed().await;
    }
}

async fn await_acks(phase: Phase, acks: Vec<(usize, oneshot::Receiver<Result<()>>)>) -> Result<()> {
    for (rank, ack) in acks {
        ack.await
            .map_err(|_| KnnError::collective(phase, rank, "worker exited before acknowledging"))??;
    }
    Ok(())
}

async fn run_worker(mut worker: Worker, mut inbox: mpsc::Receiver<WorkerMessage>) {
    while let Some(message) = inbox.recv().await {
        match message {
            WorkerMessage::Broadcast { payload, ack } => {
                let _ = ack.send(worker.receive_broadcast(payload));
            }
            WorkerMessage::Scatter { slice, ack } => {
                let _ = ack.send(worker.receive_slice(slice));
            }
            WorkerMessage::Compute { reply } => {
                let rank = worker.rank();
                let snapshot = worker.clone();
                let result = match tokio::task::spawn_blocking(move || snapshot.compute()).await {
                    Ok(result) => result,
                    Err(err) => Err(KnnError::collective(
                        Phase::Compute,
                        rank,
                        format!("compute task failed: {}", err),
                    )),
                };
                if reply.send(result).await.is_err() {
                    debug!(rank, "Coordinator stopped listening for results");
                }
            }
        }
    }
    debug!(rank = worker.rank(), "Worker inbox closed, exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(viewers: usize, items: usize, query: &[f64]) -> Arc<Broadcast> {
        Arc::new(Broadcast {
            viewers,
            items,
            query: Arc::from(query),
        })
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        assert!(matches!(
            WorkerPool::spawn(0),
            Err(KnnError::InvalidPartition(_))
        ));
    }

    #[tokio::test]
    async fn test_full_cycle_over_channels() {
        let pool = WorkerPool::spawn(2).unwrap();
        pool.broadcast(payload(3, 2, &[1.0])).await.unwrap();
        // ceil(3 / 2) = 2 -> rows 0..2 and 2..3
        pool.scatter(vec![
            RowSlice::new(0, 2, vec![1.0, 5.0, 3.0, 4.0]),
            RowSlice::new(2, 2, vec![0.5, 2.0]),
        ])
        .await
        .unwrap();

        let mut contributions = pool.gather().await.unwrap();
        contributions.sort_by_key(|c| c.rank);
        assert_eq!(contributions[0].distances, vec![0.0, 2.0]);
        assert_eq!(contributions[1].offset, 2);
        assert_eq!(contributions[1].distances, vec![0.5]);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_worker_error_is_reported() {
        let pool = WorkerPool::spawn(1).unwrap();
        // Gather without broadcast or scatter
        let result = pool.gather().await;
        assert!(matches!(
            result,
            Err(KnnError::CollectiveFailure { phase: Phase::Compute, rank: 0, .. })
        ));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_stopped_worker_fails_broadcast() {
        let mut pool = WorkerPool::spawn(3).unwrap();
        pool.stop_worker(1).await;

        let result = pool.broadcast(payload(3, 2, &[1.0])).await;
        assert!(matches!(
            result,
            Err(KnnError::CollectiveFailure { phase: Phase::Broadcast, rank: 1, .. })
        ));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_stopped_worker_fails_gather() {
        let mut pool = WorkerPool::spawn(2).unwrap();
        pool.broadcast(payload(2, 2, &[1.0])).await.unwrap();
        pool.scatter(vec![
            RowSlice::new(0, 2, vec![1.0, 1.0]),
            RowSlice::new(1, 2, vec![2.0, 2.0]),
        ])
        .await
        .unwrap();
        pool.stop_worker(0).await;

        let result = pool.gather().await;
        assert!(matches!(
            result,
            Err(KnnError::CollectiveFailure { rank: 0, .. })
        ));
        pool.shutdown().await;
    }
}
