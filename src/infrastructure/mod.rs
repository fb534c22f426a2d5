// Infrastructure for archlens: file system discovery, the on-disk cache and
// the worker pool.

pub mod cache;
pub mod concurrency;
pub mod project_loader;

pub use cache::{CacheDb, CacheLocation};
pub use concurrency::{CancellationToken, FileOutcome, OutcomeOrigin, PoolStats, WorkerPool};
pub use project_loader::ProjectLoader;
