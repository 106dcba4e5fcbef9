//! Worker Service
//!
//! Hosts worker slots inside one process. Each slot is a [`RemoteParWorker`]; all
//! slots share the process-wide [`WorkerRuntime`], so a slot configured for a job
//! that already ran here restores the registered state instead of rebuilding it.

use super::lifecycle::{RemoteParWorker, WorkerRuntime};
use super::protocol::RegistryEntry;
use super::types::*;
use crate::error::{Result, WorkerError};

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub type SharedWorker = Arc<Mutex<RemoteParWorker>>;

pub struct WorkerService {
    runtime: Arc<WorkerRuntime>,
    slots: DashMap<String, SharedWorker>,
}

impl WorkerService {
    pub fn new(runtime: Arc<WorkerRuntime>) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            slots: DashMap::new(),
        })
    }

    pub fn runtime(&self) -> &Arc<WorkerRuntime> {
        &self.runtime
    }

    /// Returns the number of open slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, slot_id: &str) -> Option<SharedWorker> {
        self.slots.get(slot_id).map(|entry| entry.value().clone())
    }

    /// Configures a new slot for a job.
    ///
    /// # Arguments
    /// * `job_id` - Scheduler-assigned job identity; slots of the same job share state.
    /// * `task_id` - Task identity of the slot, used to derive the worker id.
    /// * `program` - Serialized loop body, only parsed on the cold path.
    ///
    /// # Returns
    /// The new slot id and whether the state was initialized or restored.
    pub async fn configure(
        &self,
        job_id: &str,
        task_id: &str,
        program: &str,
    ) -> Result<(String, ConfigureOutcome)> {
        let mut worker = RemoteParWorker::new(self.runtime.clone());
        let outcome = worker.configure(job_id, task_id, program).await?;

        let slot_id = Uuid::new_v4().to_string();
        self.slots
            .insert(slot_id.clone(), Arc::new(Mutex::new(worker)));
        tracing::debug!("Slot {} configured for job {} ({:?})", slot_id, job_id, outcome);
        Ok((slot_id, outcome))
    }

    /// Executes one serialized task on a configured slot.
    ///
    /// # Returns
    /// * `Ok(report)` - output records and counter deltas of the task.
    /// * `Err(WorkerError::NotConfigured)` - the slot id is unknown.
    /// * `Err(WorkerError::TaskFailed)` - decoding or executing the task failed.
    pub async fn execute(&self, slot_id: &str, task: &str) -> Result<TaskReport> {
        let worker = self.slot(slot_id).ok_or(WorkerError::NotConfigured)?;
        let worker = worker.lock().await;
        worker.execute(task).await
    }

    /// Closes and removes a slot. Returns false for unknown slot ids.
    pub async fn close(&self, slot_id: &str) -> bool {
        let Some((_, worker)) = self.slots.remove(slot_id) else {
            return false;
        };
        worker.lock().await.close().await;
        true
    }

    /// Closes every remaining slot; used at process shutdown.
    pub async fn close_all(&self) -> usize {
        let slot_ids: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        let mut closed = 0;
        for slot_id in slot_ids {
            if self.close(&slot_id).await {
                closed += 1;
            }
        }
        closed
    }

    /// Snapshots of every registered worker state, ordered by job id.
    pub async fn registry_entries(&self) -> Vec<RegistryEntry> {
        let mut entries = Vec::new();
        for (job_id, state) in self.runtime.registry().states().await {
            let state = state.lock().await.snapshot();
            entries.push(RegistryEntry { job_id, state });
        }
        entries.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        entries
    }
}
