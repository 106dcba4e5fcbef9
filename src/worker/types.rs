use crate::cache::stats::CacheStatisticsSnapshot;
use crate::runtime::context::ExecutionContext;
use crate::runtime::program::{ParForBody, ProgramBlock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::Mutex;

/// Scheduler-assigned identity of a job; keys the reuse registry.
pub type JobId = String;

/// Worker ids keep at most this many decimal digits of the task identity.
pub const MAX_WORKER_ID_DIGITS: usize = 9;

pub const PARFOR_COUNTER_GROUP: &str = "ParFOR";
pub const CACHING_COUNTER_GROUP: &str = "Caching";

static DIGIT_GROUPS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("digit group pattern is valid"));

/// Task identity of a worker plus the integer id derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub task_id: String,
    pub worker_id: u32,
}

impl WorkerIdentity {
    pub fn from_task_id(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            worker_id: Self::extract_worker_id(task_id),
        }
    }

    /// Concatenates the digit groups of `task_id` from right to left while the result
    /// fits in [`MAX_WORKER_ID_DIGITS`]; a single longer group keeps its rightmost digits.
    /// Identities without digits (e.g. `local`) map to 0.
    ///
    /// `task_201401011200_0001_m_000012` → 12
    pub fn extract_worker_id(task_id: &str) -> u32 {
        let groups: Vec<&str> = DIGIT_GROUPS.find_iter(task_id).map(|m| m.as_str()).collect();
        let mut digits = String::new();

        for group in groups.into_iter().rev() {
            if digits.is_empty() && group.len() > MAX_WORKER_ID_DIGITS {
                digits = group[group.len() - MAX_WORKER_ID_DIGITS..].to_string();
                break;
            }
            if digits.len() + group.len() > MAX_WORKER_ID_DIGITS {
                break;
            }
            digits.insert_str(0, group);
        }

        digits.parse().unwrap_or(0)
    }
}

/// Everything a configured worker needs to execute tasks, reusable across task slots.
#[derive(Debug)]
pub struct WorkerState {
    pub identity: WorkerIdentity,
    pub child_blocks: Arc<Vec<ProgramBlock>>,
    pub ec: ExecutionContext,
    pub result_vars: Vec<String>,
    pub num_iters: u64,
    pub num_tasks: u64,
    /// Result variable → output file name used by the last export.
    pub file_names: BTreeMap<String, String>,
}

pub type SharedWorkerState = Arc<Mutex<WorkerState>>;

impl WorkerState {
    pub fn new(identity: WorkerIdentity, body: ParForBody) -> Self {
        Self {
            identity,
            child_blocks: body.child_blocks,
            ec: body.ec,
            result_vars: body.result_vars,
            num_iters: 0,
            num_tasks: 0,
            file_names: BTreeMap::new(),
        }
    }

    /// Disables cache cleanup for every matrix-typed result variable.
    pub fn pin_result_variables(&mut self) -> usize {
        let mut pinned = 0;
        for var in &self.result_vars {
            if let Ok(mo) = self.ec.matrix_mut(var) {
                mo.enable_cleanup(false);
                pinned += 1;
            }
        }
        pinned
    }

    pub fn snapshot(&self) -> WorkerStateSnapshot {
        WorkerStateSnapshot {
            identity: self.identity.clone(),
            result_vars: self.result_vars.clone(),
            variables: self.ec.variable_names(),
            num_iters: self.num_iters,
            num_tasks: self.num_tasks,
            file_names: self.file_names.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStateSnapshot {
    pub identity: WorkerIdentity,
    pub result_vars: Vec<String>,
    pub variables: Vec<String>,
    pub num_iters: u64,
    pub num_tasks: u64,
    pub file_names: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigureOutcome {
    /// Cold path: program parsed, cache initialized, state built.
    Initialized,
    /// Fast path: state restored from the reuse registry.
    Restored,
}

/// One key/value record for the scheduler's merge stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub key: u64,
    pub value: String,
}

/// Secondary statistics block; times are in microseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub body_time_us: u64,
    pub cache: CacheStatisticsSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterEntry {
    pub group: String,
    pub name: String,
    pub value: u64,
}

/// Counter deltas contributed by a single task invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounters {
    pub iterations: u64,
    pub tasks: u64,
    pub statistics: Option<StatisticsSnapshot>,
}

impl TaskCounters {
    /// Flattens the counters into named entries for the scheduler's reporter.
    pub fn entries(&self) -> Vec<CounterEntry> {
        let mut entries = vec![
            counter(PARFOR_COUNTER_GROUP, "NUMITERS", self.iterations),
            counter(PARFOR_COUNTER_GROUP, "NUMTASKS", self.tasks),
        ];

        if let Some(stats) = &self.statistics {
            let cache = &stats.cache;
            entries.extend([
                counter(PARFOR_COUNTER_GROUP, "BODY_TIME", stats.body_time_us),
                counter(CACHING_COUNTER_GROUP, "CACHE_HITS_MEM", cache.mem_hits),
                counter(CACHING_COUNTER_GROUP, "CACHE_HITS_FSBUFF", cache.buffer_hits),
                counter(CACHING_COUNTER_GROUP, "CACHE_HITS_FS", cache.local_file_hits),
                counter(CACHING_COUNTER_GROUP, "CACHE_HITS_DURABLE", cache.durable_hits),
                counter(CACHING_COUNTER_GROUP, "CACHE_WRITES_FSBUFF", cache.buffer_writes),
                counter(CACHING_COUNTER_GROUP, "CACHE_WRITES_FS", cache.local_file_writes),
                counter(CACHING_COUNTER_GROUP, "CACHE_WRITES_DURABLE", cache.durable_writes),
                counter(CACHING_COUNTER_GROUP, "CACHE_TIME_ACQR", cache.acquire_read_us),
                counter(CACHING_COUNTER_GROUP, "CACHE_TIME_ACQM", cache.acquire_modify_us),
                counter(CACHING_COUNTER_GROUP, "CACHE_TIME_RLS", cache.release_us),
                counter(CACHING_COUNTER_GROUP, "CACHE_TIME_EXP", cache.export_us),
            ]);
        }
        entries
    }
}

fn counter(group: &str, name: &str, value: u64) -> CounterEntry {
    CounterEntry {
        group: group.to_string(),
        name: name.to_string(),
        value,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub records: Vec<OutputRecord>,
    pub counters: TaskCounters,
}

/// Process-wide loop-body timing, reset at every configure.
#[derive(Debug, Default)]
pub struct ExecutionStatistics {
    body_time_us: AtomicU64,
}

impl ExecutionStatistics {
    pub fn record_body_time(&self, elapsed: Duration) {
        self.body_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn body_time_us(&self) -> u64 {
        self.body_time_us.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.body_time_us.store(0, Ordering::Relaxed);
    }
}
