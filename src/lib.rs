//! Remote ParFOR Worker Library
//!
//! Worker side of a data-parallel `parfor` loop runtime: a batch scheduler splits the
//! iteration space of a loop into tasks and ships them, together with the serialized
//! loop body, to worker processes built from this crate.
//!
//! ## Architecture Modules
//! - **`task`**: Compact task descriptors (iteration ranges and sets).
//! - **`cache`**: The process-wide caching subsystem for matrix values (spill, reload,
//!   export, cleanup, statistics).
//! - **`runtime`**: The loop-body symbol table and child blocks.
//! - **`worker`**: Worker lifecycle, state reuse across task slots, task execution,
//!   result export and the HTTP surface.
//! - **`config`** / **`error`**: Process settings and the error taxonomy.

pub mod cache;
pub mod config;
pub mod error;
pub mod runtime;
pub mod task;
pub mod worker;
