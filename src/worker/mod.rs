//! Remote ParFOR Worker
//!
//! Executes parallel-for loop tasks on behalf of a batch scheduler. A worker process
//! is configured once per job, runs any number of tasks against the same loop body
//! and exports the modified result variables for the scheduler's merge stage.
//!
//! ## Worker Reuse
//! The batch framework may keep a worker process alive and schedule further task slots
//! of the same job into it. With reuse enabled, configured state is kept in the
//! process-wide `ReuseRegistry` and later slots restore it:
//! 1. **Configure**: Cold path parses the program and initializes the cache; the fast
//!    path restores registered state and only resets statistics.
//! 2. **Execute**: Decode the task, run every iteration, export dirty result variables.
//!    With reuse, each result variable keeps one output file across tasks.
//! 3. **Close**: Remove the process cache directory and leave every registered value
//!    reconstructible, so the next slot still sees correct data.
//!
//! ## Submodules
//! - **`types`**: Worker identity, worker state, counters and reports.
//! - **`registry`**: The job → worker state reuse registry.
//! - **`lifecycle`**: `WorkerRuntime` and `RemoteParWorker` (configure / execute / close).
//! - **`executor`**: Runs the iterations of a single task.
//! - **`export`**: Writes result variables and renders their descriptors.
//! - **`service`**: Slot management for a long-lived worker process.
//! - **`protocol`** / **`handlers`**: The HTTP surface of the service.

pub mod executor;
pub mod export;
pub mod handlers;
pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod types;
