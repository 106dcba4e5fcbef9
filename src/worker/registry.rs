//! Worker Reuse Registry
//!
//! Process-wide mapping from job identity to configured worker state. When the batch
//! framework schedules several task slots of the same job into one long-lived process,
//! every slot after the first restores its state from here instead of re-parsing the
//! program and re-initializing the cache. Several jobs may be registered at once
//! (e.g. an in-process harness running multiple jobs).
//!
//! All access goes through one mutex. It only guards the map itself and is never held
//! across filesystem I/O.

use super::types::{JobId, SharedWorkerState};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct ReuseRegistry {
    states: Mutex<HashMap<JobId, SharedWorkerState>>,
}

impl ReuseRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Finds the state registered for a job.
    ///
    /// # Returns
    /// * `Some(state)` - a handle to the shared state of an earlier configure.
    /// * `None` - the job has not been configured in this process.
    pub async fn lookup(&self, job_id: &str) -> Option<SharedWorkerState> {
        self.states.lock().await.get(job_id).cloned()
    }

    /// Registers `state` for `job_id` unless another state got there first.
    ///
    /// # Returns
    /// The state that is registered for the job afterwards, and whether it is `state`.
    pub async fn insert_if_absent(
        &self,
        job_id: &str,
        state: SharedWorkerState,
    ) -> (SharedWorkerState, bool) {
        let mut states = self.states.lock().await;
        match states.get(job_id) {
            Some(existing) => (existing.clone(), false),
            None => {
                states.insert(job_id.to_string(), state.clone());
                tracing::debug!("Registered worker state for job {}", job_id);
                (state, true)
            }
        }
    }

    /// Handles to every registered state. The lock is released before returning.
    pub async fn states(&self) -> Vec<(JobId, SharedWorkerState)> {
        self.states
            .lock()
            .await
            .iter()
            .map(|(job_id, state)| (job_id.clone(), state.clone()))
            .collect()
    }

    /// Checks whether a state is registered for `job_id`.
    pub async fn contains(&self, job_id: &str) -> bool {
        self.states.lock().await.contains_key(job_id)
    }

    /// Returns the identities of all registered jobs (in no particular order).
    pub async fn job_ids(&self) -> Vec<JobId> {
        self.states.lock().await.keys().cloned().collect()
    }

    /// Returns the number of registered jobs.
    pub async fn len(&self) -> usize {
        self.states.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.lock().await.is_empty()
    }
}

impl Default for ReuseRegistry {
    fn default() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }
}
