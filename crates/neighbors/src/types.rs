//! Value types passed between pipeline phases.
//!
//! Each phase owns a distinct value: the coordinator's matrix becomes one
//! [`RowSlice`] per worker, each slice becomes [`WorkerDistances`], and the
//! gathered distances become [`DistanceRecord`]s.

use data_loader::{Rating, ViewerId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shape and query replicated to every worker before scatter
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    /// Number of viewers (`n`)
    pub viewers: usize,
    /// Number of items including the target (`m`)
    pub items: usize,
    /// Query ratings, length `m - 1`
    pub query: Arc<[Rating]>,
}

/// A worker's owned block of contiguous rows
#[derive(Debug, Clone, PartialEq)]
pub struct RowSlice {
    /// Global viewer id of the first row
    pub offset: ViewerId,
    /// Row width (`m`)
    pub items: usize,
    /// Row-major ratings, `rows() * items` long
    pub values: Vec<Rating>,
}

impl RowSlice {
    pub fn new(offset: ViewerId, items: usize, values: Vec<Rating>) -> Self {
        Self {
            offset,
            items,
            values,
        }
    }

    /// Number of rows held
    pub fn rows(&self) -> usize {
        if self.items == 0 {
            0
        } else {
            self.values.len() / self.items
        }
    }
}

/// One worker's contribution to the gather step
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerDistances {
    pub rank: usize,
    /// Global viewer id of `distances[0]`
    pub offset: ViewerId,
    pub distances: Vec<f64>,
}

/// Distance from one viewer to the query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceRecord {
    pub viewer_id: ViewerId,
    pub distance: f64,
}

/// A ranked neighbor together with its target-item rating
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub viewer_id: ViewerId,
    pub distance: f64,
    pub target_rating: Rating,
}

/// Result of one prediction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    /// The k closest viewers, nearest first
    pub neighbors: Vec<Neighbor>,
    /// Mean target rating over `neighbors`
    pub prediction: Rating,
}
