//! The job engine: bounded worker pool, per-job runner, prediction service,
//! and the retention reaper.

pub mod pool;
pub mod predictor;
pub mod reaper;
pub mod runner;

pub use pool::{JobExecutor, WorkerPool};
pub use predictor::Predictor;
pub use runner::JobRunner;
