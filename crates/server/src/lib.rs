//! Server crate for concurrent k-NN prediction.
//!
//! This crate maps every worker rank onto its own tokio task and drives the
//! prediction pipeline over channels instead of in-process calls.

pub mod orchestrator;
pub mod pool;

pub use orchestrator::PredictionOrchestrator;
pub use pool::WorkerPool;
