//! Caching Subsystem
//!
//! Manages the residency of large matrix values on behalf of the loop body.
//!
//! ## Core Concepts
//! - **Residency**: A matrix is resident, spilled to the local cache directory,
//!   empty (reconstructible from a retained copy or durable storage) or destroyed.
//! - **Pinning**: Values with cleanup disabled are never spilled or deleted; result
//!   variables are pinned so their files survive until the scheduler reads them.
//! - **Export**: Dirty values are written to durable storage under a stable file name.
//!
//! ## Submodules
//! - **`manager`**: The process-wide `CacheManager`.
//! - **`matrix`**: `MatrixObject`, `MatrixBlock` and the residency states.
//! - **`stats`**: Hit, write and timing counters with explicit reset.

pub mod manager;
pub mod matrix;
pub mod stats;

pub use manager::CacheManager;
pub use matrix::{MatrixBlock, MatrixMeta, MatrixObject, Residency};
pub use stats::{CacheStatistics, CacheStatisticsSnapshot};

#[cfg(test)]
mod tests;
