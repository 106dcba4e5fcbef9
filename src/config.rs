use std::path::PathBuf;

/// Process-wide settings of a remote parfor worker.
///
/// One `WorkerConfig` is handed to the [`WorkerRuntime`](crate::worker::lifecycle::WorkerRuntime)
/// at process start and shared by every worker slot hosted in that process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Keep configured worker state in the reuse registry so later task slots of
    /// the same job skip program parsing and cache initialization.
    pub reuse_workers: bool,
    /// Single-process testing mode: close leaves the working directory in place.
    pub local_mode: bool,
    /// Report the secondary statistics block with every task.
    pub statistics: bool,
    /// Parent directory for per-process working directories.
    pub scratch_dir: PathBuf,
    /// Directory standing in for durable storage (exported result files).
    pub durable_dir: PathBuf,
    /// Initial prefix for local spill files.
    pub local_cache_prefix: String,
    /// Initial prefix for durable file names.
    pub durable_cache_prefix: String,
    /// Resident cell budget; unpinned matrices are spilled once it is exceeded.
    pub memory_budget_cells: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            reuse_workers: true,
            local_mode: false,
            statistics: false,
            scratch_dir: std::env::temp_dir().join("parfor-worker"),
            durable_dir: PathBuf::from("durable"),
            local_cache_prefix: "cache".to_string(),
            durable_cache_prefix: "out".to_string(),
            memory_budget_cells: None,
        }
    }
}

impl WorkerConfig {
    pub fn new(scratch_dir: impl Into<PathBuf>, durable_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            durable_dir: durable_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_reuse(mut self, reuse_workers: bool) -> Self {
        self.reuse_workers = reuse_workers;
        self
    }

    pub fn with_local_mode(mut self, local_mode: bool) -> Self {
        self.local_mode = local_mode;
        self
    }

    pub fn with_statistics(mut self, statistics: bool) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn with_memory_budget(mut self, cells: usize) -> Self {
        self.memory_budget_cells = Some(cells);
        self
    }

    /// Whether the secondary statistics block is reported with task counters.
    pub fn reports_statistics(&self) -> bool {
        self.statistics && !self.local_mode
    }
}
