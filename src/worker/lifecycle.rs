//! Worker Lifecycle
//!
//! Configure and close of a remote parfor worker.
//!
//! ## Configure
//! 1. **Fast path**: with reuse enabled and state registered for the job, restore it.
//! 2. **Cold path**: derive the worker identity, decode the loop body, activate the
//!    cache in a private working directory (once per process), suffix the cache file
//!    prefixes with the worker id, pin the result variables and register the state.
//! 3. Either way, reset the statistics so each invocation reports only its own share.
//!
//! ## Close
//! Tears down the cache directory (except in local mode) and moves every matrix of
//! every registered state into the evicted-but-reconstructible state, so a later slot
//! scheduled into this process still sees correct values.

use super::executor::TaskExecutor;
use super::registry::ReuseRegistry;
use super::types::*;
use crate::cache::manager::CacheManager;
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::runtime::context::Data;
use crate::runtime::program::parse_parfor_body;

use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Process-wide collaborators shared by every worker slot in this process.
pub struct WorkerRuntime {
    config: WorkerConfig,
    registry: Arc<ReuseRegistry>,
    cache: Arc<CacheManager>,
    exec_stats: ExecutionStatistics,
}

impl WorkerRuntime {
    pub fn new(config: WorkerConfig) -> Arc<Self> {
        let cache = Arc::new(CacheManager::new(&config));
        Arc::new(Self {
            config,
            registry: ReuseRegistry::new(),
            cache,
            exec_stats: ExecutionStatistics::default(),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ReuseRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn execution_statistics(&self) -> &ExecutionStatistics {
        &self.exec_stats
    }

    /// Zeroes cache and loop-body statistics so the next report covers one invocation.
    pub fn reset_statistics(&self) {
        self.cache.statistics().reset();
        self.exec_stats.reset();
    }

    pub fn statistics_snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            body_time_us: self.exec_stats.body_time_us(),
            cache: self.cache.statistics().snapshot(),
        }
    }
}

/// Unique id of this worker process, used to name its private working directory.
pub fn create_process_unique_id() -> String {
    format!("{}_{}", std::process::id(), Uuid::new_v4().simple())
}

/// A remote parfor worker: `configure` once, `execute` per task, `close` at teardown.
pub struct RemoteParWorker {
    runtime: Arc<WorkerRuntime>,
    state: Option<SharedWorkerState>,
    registered: bool,
}

impl RemoteParWorker {
    pub fn new(runtime: Arc<WorkerRuntime>) -> Self {
        Self {
            runtime,
            state: None,
            registered: false,
        }
    }

    pub fn runtime(&self) -> &Arc<WorkerRuntime> {
        &self.runtime
    }

    pub fn is_configured(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<SharedWorkerState> {
        self.state.clone()
    }

    /// Comparable view of the worker state, `None` before configure.
    pub async fn snapshot(&self) -> Option<WorkerStateSnapshot> {
        match &self.state {
            Some(state) => Some(state.lock().await.snapshot()),
            None => None,
        }
    }

    /// Prepares this worker for `job_id`.
    ///
    /// A cold-path failure is reported as [`WorkerError::Configuration`] and must be
    /// treated as fatal by the hosting process: partially initialized process-wide
    /// cache state cannot be rolled back. Nothing is registered in that case.
    pub async fn configure(
        &mut self,
        job_id: &str,
        task_id: &str,
        program: &str,
    ) -> Result<ConfigureOutcome> {
        let reuse = self.runtime.config().reuse_workers;

        if reuse {
            if let Some(state) = self.runtime.registry().lookup(job_id).await {
                {
                    let restored = state.lock().await;
                    tracing::debug!(
                        "Reusing configured worker {} ({}) for job {}",
                        restored.identity.task_id,
                        restored.identity.worker_id,
                        job_id
                    );
                }
                self.state = Some(state);
                self.registered = true;
                self.runtime.reset_statistics();
                return Ok(ConfigureOutcome::Restored);
            }
        }

        tracing::info!("Configuring worker {} for job {}", task_id, job_id);
        let state = self
            .initialize(task_id, program)
            .await
            .map_err(WorkerError::configuration)?;
        let state = Arc::new(Mutex::new(state));

        if reuse {
            let (registered, inserted) = self
                .runtime
                .registry()
                .insert_if_absent(job_id, state)
                .await;
            if !inserted {
                tracing::warn!(
                    "Job {} was configured concurrently, adopting the registered state",
                    job_id
                );
            }
            self.state = Some(registered);
            self.registered = true;
        } else {
            self.state = Some(state);
            self.registered = false;
        }

        self.runtime.reset_statistics();
        Ok(ConfigureOutcome::Initialized)
    }

    async fn initialize(&self, task_id: &str, program: &str) -> Result<WorkerState> {
        let identity = WorkerIdentity::from_task_id(task_id);
        let body = parse_parfor_body(program)?;
        let cache = self.runtime.cache();

        // Each worker process gets its own cache directory for simplified cleanup
        if !cache.is_active().await {
            let uid = create_process_unique_id();
            cache.create_working_directory(&uid).await?;
            cache.init_caching().await?;
        }

        if cache.apply_worker_suffix(identity.worker_id).await {
            tracing::debug!(
                "Cache file prefixes suffixed with worker id {}",
                identity.worker_id
            );
        }

        let mut state = WorkerState::new(identity, body);
        let pinned = state.pin_result_variables();
        tracing::debug!(
            "Worker {} ready: {} blocks, {} result variables ({} pinned)",
            state.identity.worker_id,
            state.child_blocks.len(),
            state.result_vars.len(),
            pinned
        );
        Ok(state)
    }

    /// Executes one serialized task against this worker's state.
    pub async fn execute(&self, serialized_task: &str) -> Result<TaskReport> {
        let state = self.state.as_ref().ok_or(WorkerError::NotConfigured)?;
        let mut state = state.lock().await;
        TaskExecutor::new(&self.runtime)
            .execute(&mut state, serialized_task)
            .await
    }

    /// Process teardown. Errors are logged and swallowed.
    pub async fn close(&mut self) {
        let cache = self.runtime.cache();
        let config = self.runtime.config();

        if !config.local_mode {
            // Spill files are the only copy of some values; read them back first
            for (owner, state) in self.surviving_states().await {
                let mut state = state.lock().await;
                match cache.preserve_spilled(&mut state.ec).await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!("Preserved {} spilled values of {}", n, owner),
                    Err(e) => tracing::warn!("Failed to preserve spilled values of {}: {}", owner, e),
                }
            }
            if let Err(e) = cache.cleanup_cache_dir().await {
                tracing::warn!("Failed to clean up cache directory: {}", e);
            }
            cache.disable_caching().await;
            if let Err(e) = cache.cleanup_working_directory().await {
                tracing::warn!("Failed to remove working directory: {}", e);
            }
        }

        // Emptied values reload lazily, so deleting the working directory above does
        // not invalidate objects still referenced by registered workers.
        if config.reuse_workers {
            for (job_id, state) in self.runtime.registry().states().await {
                let mut state = state.lock().await;
                let marked = cache.mark_matrices_empty(&mut state.ec);
                tracing::trace!("Marked {} matrices of job {} empty", marked, job_id);
            }
        }

        if !self.registered {
            if let Some(state) = &self.state {
                let mut state = state.lock().await;
                release_exclusive_values(cache, &mut state).await;
            }
        }

        tracing::info!("Worker closed");
    }

    /// States whose values must outlive the cache directory: every registered state,
    /// plus this worker's own state when it is not registered.
    async fn surviving_states(&self) -> Vec<(String, SharedWorkerState)> {
        let mut states = if self.runtime.config().reuse_workers {
            self.runtime.registry().states().await
        } else {
            Vec::new()
        };
        if !self.registered {
            if let Some(state) = &self.state {
                states.push(("this worker".to_string(), state.clone()));
            }
        }
        states
    }
}

/// Teardown of a state nobody else references: pinned results become reconstructible,
/// everything else is destroyed.
async fn release_exclusive_values(cache: &CacheManager, state: &mut WorkerState) {
    for name in state.ec.variable_names() {
        let pinned = match state.ec.get_mut(&name) {
            Some(Data::Matrix(mo)) if mo.is_pinned() => {
                mo.set_empty_status();
                true
            }
            Some(Data::Matrix(_)) => false,
            _ => continue,
        };
        if pinned {
            continue;
        }
        if let Some(Data::Matrix(mo)) = state.ec.remove(&name) {
            if let Err(e) = cache.cleanup_variable(mo).await {
                tracing::warn!("Failed to clean up '{}': {}", name, e);
            }
        }
    }
}
