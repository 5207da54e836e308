//! Error types for the nearest-neighbor pipeline.
//!
//! Every variant is fatal for the run that raised it: there is no partial
//! result once a precondition or a collective step fails.

use thiserror::Error;

/// Collective step in which a failure was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Broadcast,
    Scatter,
    Compute,
    Gather,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Broadcast => "broadcast",
            Phase::Scatter => "scatter",
            Phase::Compute => "compute",
            Phase::Gather => "gather",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum KnnError {
    /// `n` or `m` is zero, a buffer does not match its declared shape, or the
    /// query length is not `m - 1`
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Zero workers, or a plan whose ranges do not tile `[0, n)`
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    #[error("Invalid k: {k} (must be at least 1)")]
    InvalidK { k: usize },

    #[error("k = {k} exceeds the number of viewers ({n})")]
    KExceedsPopulation { k: usize, n: usize },

    /// A participant did not contribute to a collective step
    #[error("Collective {phase} failed on worker {rank}: {reason}")]
    CollectiveFailure {
        phase: Phase,
        rank: usize,
        reason: String,
    },
}

impl KnnError {
    pub fn collective(phase: Phase, rank: usize, reason: impl Into<String>) -> Self {
        KnnError::CollectiveFailure {
            phase,
            rank,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KnnError>;
