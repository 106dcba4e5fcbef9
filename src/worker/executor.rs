//! Task Executor
//!
//! Runs one task per invocation: decode, execute every designated iteration of the
//! loop body, export the result variables, then advance the worker counters.
//! Decode and execution failures are wrapped into a single task failure; retrying
//! is up to the scheduler.

use super::export::ResultExporter;
use super::lifecycle::WorkerRuntime;
use super::types::*;
use crate::error::{Result, WorkerError};
use crate::runtime::context::ScalarObject;
use crate::task::{Task, TaskCodec};

use std::time::Instant;

pub struct TaskExecutor<'a> {
    runtime: &'a WorkerRuntime,
}

impl<'a> TaskExecutor<'a> {
    pub fn new(runtime: &'a WorkerRuntime) -> Self {
        Self { runtime }
    }

    pub async fn execute(
        &self,
        state: &mut WorkerState,
        serialized_task: &str,
    ) -> Result<TaskReport> {
        tracing::trace!(
            "Executing task on worker {} ({})",
            state.identity.task_id,
            state.identity.worker_id
        );

        let (iterations, records) = self
            .run(state, serialized_task)
            .await
            .map_err(|e| WorkerError::task_failed(serialized_task, e))?;

        state.num_iters += iterations;
        state.num_tasks += 1;

        let statistics = self
            .runtime
            .config()
            .reports_statistics()
            .then(|| self.runtime.statistics_snapshot());

        Ok(TaskReport {
            records,
            counters: TaskCounters {
                iterations,
                tasks: 1,
                statistics,
            },
        })
    }

    async fn run(
        &self,
        state: &mut WorkerState,
        serialized_task: &str,
    ) -> Result<(u64, Vec<OutputRecord>)> {
        let task = TaskCodec::parse(serialized_task)?;
        let owner = task.owner().unwrap_or(state.identity.task_id.as_str()).to_string();
        tracing::debug!(
            "Task {} for {}: {} iterations",
            task.to_compact_string(),
            owner,
            task.len()
        );

        let started = Instant::now();
        let iterations = self.execute_iterations(state, &task).await?;
        self.runtime
            .execution_statistics()
            .record_body_time(started.elapsed());

        let exporter = ResultExporter::new(self.runtime.cache(), self.runtime.config().reuse_workers);
        let records = exporter.export(state).await?;

        Ok((iterations, records))
    }

    async fn execute_iterations(&self, state: &mut WorkerState, task: &Task) -> Result<u64> {
        let cache = self.runtime.cache();
        let budget = self.runtime.config().memory_budget_cells;
        let blocks = state.child_blocks.clone();
        let mut executed = 0;

        for iteration in task.iterations() {
            state
                .ec
                .set_scalar(task.iter_var(), ScalarObject::Int(iteration));

            for block in blocks.iter() {
                block.execute(&mut state.ec, cache).await?;
            }

            if let Some(budget) = budget {
                cache.relieve_memory_pressure(&mut state.ec, budget).await?;
            }
            executed += 1;
        }

        Ok(executed)
    }
}
