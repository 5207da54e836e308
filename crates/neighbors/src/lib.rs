//! # Neighbors Crate
//!
//! Distributed k-nearest-neighbor rating prediction.
//!
//! ## Components
//!
//! ### Partitioner (`partition`)
//! Splits `n` viewers into contiguous per-worker ranges from `(n, p)` alone.
//!
//! ### DistanceComputer (`distance`)
//! L1 distance from each local viewer to the query over the comparison items.
//!
//! ### Aggregator (`aggregate`)
//! Rebuilds the global distance sequence in viewer order from per-worker
//! contributions that may arrive in any order.
//!
//! ### Ranker (`rank`)
//! Selects the k nearest viewers; ties go to the lower viewer id.
//!
//! ### Controller (`controller`)
//! Broadcast, scatter, compute, gather, rank, average. Runs over any
//! [`Collective`] substrate.
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{load_ratings, QueryVector};
//! use neighbors::predict_local;
//!
//! let matrix = load_ratings(Path::new("data/ratings.txt"))?;
//! let query = QueryVector::parse("1,2,3,4")?;
//!
//! let report = predict_local(&matrix, &query, 4, 2)?;
//! println!("Predicted rating: {:.1}", report.prediction);
//! ```
//!
//! ## Failure Model
//!
//! Every error aborts the whole run. A worker that never answers a collective
//! step stalls the run: there is no timeout and no partial result.

pub mod aggregate;
pub mod cluster;
pub mod controller;
pub mod distance;
pub mod error;
pub mod partition;
pub mod rank;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use cluster::{Collective, LocalCluster};
pub use error::{KnnError, Phase, Result};
pub use partition::{plan, PartitionPlan, WorkerRange};
pub use types::{
    Broadcast, DistanceRecord, Neighbor, PredictionReport, RowSlice, WorkerDistances,
};
pub use worker::Worker;

use data_loader::{QueryVector, RatingMatrix};

/// Predict with `workers` in-process workers run sequentially
pub fn predict_local(
    matrix: &RatingMatrix,
    query: &QueryVector,
    workers: usize,
    k: usize,
) -> Result<PredictionReport> {
    let mut cluster = LocalCluster::new(workers)?;
    controller::predict(&mut cluster, matrix, query, k)
}
