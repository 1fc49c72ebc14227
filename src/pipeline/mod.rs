pub mod pool;
pub mod runner;

pub use pool::{PoolError, PoolStats, WorkerPool};
pub use runner::{ImportSummary, Importer, PipelineError};
