//! Cache Manager
//!
//! Process-wide caching subsystem for matrix values. One instance is created at
//! process start and shared by every worker hosted in the process.
//!
//! ## Responsibilities
//! - **Activation**: Owns the private working directory and the cache directory below it.
//! - **File naming**: Local (spill) and durable file prefixes, suffixed per worker so
//!   concurrent worker processes never collide on file names.
//! - **Residency**: Spills unpinned values under memory pressure and reloads them on acquire.
//! - **Export**: Persists values to durable storage for the scheduler's merge stage.

use super::matrix::{MatrixBlock, MatrixObject, Residency};
use super::stats::{CacheHit, CacheStatistics, CacheTimer, CacheWrite};
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::runtime::context::ExecutionContext;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;

#[derive(Debug)]
struct CacheState {
    active: bool,
    working_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    local_prefix: String,
    durable_prefix: String,
}

enum ReloadSource {
    Buffer(MatrixBlock),
    LocalFile(PathBuf),
    Durable,
}

pub struct CacheManager {
    scratch_dir: PathBuf,
    durable_dir: PathBuf,
    state: RwLock<CacheState>,
    file_seq: AtomicU64,
    stats: CacheStatistics,
}

impl CacheManager {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            scratch_dir: config.scratch_dir.clone(),
            durable_dir: config.durable_dir.clone(),
            state: RwLock::new(CacheState {
                active: false,
                working_dir: None,
                cache_dir: None,
                local_prefix: config.local_cache_prefix.clone(),
                durable_prefix: config.durable_cache_prefix.clone(),
            }),
            file_seq: AtomicU64::new(0),
            stats: CacheStatistics::new(),
        }
    }

    /// Process-wide cache counters; reset explicitly by the worker runtime.
    pub fn statistics(&self) -> &CacheStatistics {
        &self.stats
    }

    pub fn durable_dir(&self) -> &Path {
        &self.durable_dir
    }

    /// Whether caching has been initialized in this process and not yet disabled.
    pub async fn is_active(&self) -> bool {
        self.state.read().await.active
    }

    pub async fn working_dir(&self) -> Option<PathBuf> {
        self.state.read().await.working_dir.clone()
    }

    pub async fn cache_dir(&self) -> Option<PathBuf> {
        self.state.read().await.cache_dir.clone()
    }

    /// Creates `<scratch>/<uid>` as this process's private working directory.
    pub async fn create_working_directory(&self, uid: &str) -> Result<PathBuf> {
        let dir = self.scratch_dir.join(uid);
        tokio::fs::create_dir_all(&dir).await?;
        self.state.write().await.working_dir = Some(dir.clone());
        tracing::debug!("Created working directory {}", dir.display());
        Ok(dir)
    }

    /// Creates the cache directory inside the working directory and activates caching.
    pub async fn init_caching(&self) -> Result<()> {
        let working_dir = self
            .working_dir()
            .await
            .ok_or_else(|| WorkerError::Cache("no working directory to cache in".to_string()))?;
        let cache_dir = working_dir.join("cache");
        tokio::fs::create_dir_all(&cache_dir).await?;

        let mut state = self.state.write().await;
        state.cache_dir = Some(cache_dir);
        state.active = true;
        tracing::info!("Caching activated in {}", working_dir.display());
        Ok(())
    }

    /// Prefix of local spill file names (`cache`, or `cache_<worker id>` once suffixed).
    pub async fn local_prefix(&self) -> String {
        self.state.read().await.local_prefix.clone()
    }

    /// Prefix of durable output file names (`out`, or `out_<worker id>` once suffixed).
    pub async fn durable_prefix(&self) -> String {
        self.state.read().await.durable_prefix.clone()
    }

    /// Whether a worker id has already been appended to the file prefixes.
    pub async fn has_worker_suffix(&self) -> bool {
        self.state.read().await.local_prefix.contains('_')
    }

    /// Appends `_<worker_id>` to both file prefixes unless a worker suffix is already
    /// present (e.g. set by an earlier worker in local mode). Returns whether it applied.
    pub async fn apply_worker_suffix(&self, worker_id: u32) -> bool {
        let mut state = self.state.write().await;
        if state.local_prefix.contains('_') {
            return false;
        }
        state.local_prefix = format!("{}_{}", state.local_prefix, worker_id);
        state.durable_prefix = format!("{}_{}", state.durable_prefix, worker_id);
        true
    }

    /// Fresh durable file name for `var`: `<durable_prefix>_<var>_<seq>`.
    pub async fn allocate_file_name(&self, var: &str) -> String {
        let prefix = self.durable_prefix().await;
        format!("{}_{}_{}", prefix, var, self.next_seq())
    }

    fn next_seq(&self) -> u64 {
        self.file_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Makes `mo` resident for reading, reloading it from the retained copy, its spill
    /// file or durable storage as needed. Pair with [`CacheManager::release`].
    ///
    /// # Returns
    /// The resident block, or an error if the value was destroyed or cannot be reloaded.
    pub async fn acquire_read<'a>(&self, mo: &'a mut MatrixObject) -> Result<&'a MatrixBlock> {
        let started = Instant::now();
        self.make_resident(mo).await?;
        self.stats.record_time(CacheTimer::AcquireRead, started.elapsed());
        mo.block()
            .ok_or_else(|| WorkerError::Cache("matrix is not resident after acquire".to_string()))
    }

    /// Like `acquire_read`, but the caller intends to modify the value, so it becomes dirty.
    pub async fn acquire_modify<'a>(
        &self,
        mo: &'a mut MatrixObject,
    ) -> Result<&'a mut MatrixBlock> {
        let started = Instant::now();
        self.make_resident(mo).await?;
        mo.set_dirty(true);
        self.stats.record_time(CacheTimer::AcquireModify, started.elapsed());
        mo.block_mut()
            .ok_or_else(|| WorkerError::Cache("matrix is not resident after acquire".to_string()))
    }

    /// Ends an acquire, refreshing the metadata from the (possibly modified) block.
    pub fn release(&self, mo: &mut MatrixObject) {
        let started = Instant::now();
        mo.refresh_meta();
        self.stats.record_time(CacheTimer::Release, started.elapsed());
    }

    async fn make_resident(&self, mo: &mut MatrixObject) -> Result<()> {
        let source = match mo.residency_mut() {
            Residency::Resident(_) => {
                self.stats.record_hit(CacheHit::Memory);
                return Ok(());
            }
            Residency::Spilled(path) => ReloadSource::LocalFile(path.clone()),
            Residency::Empty { retained } => match retained.take() {
                Some(block) => ReloadSource::Buffer(block),
                None => ReloadSource::Durable,
            },
            Residency::Destroyed => {
                return Err(WorkerError::Cache(
                    "cannot acquire a destroyed matrix".to_string(),
                ));
            }
        };

        let block = match source {
            ReloadSource::Buffer(block) => {
                self.stats.record_hit(CacheHit::Buffer);
                block
            }
            ReloadSource::LocalFile(path) => {
                let block = read_block(&path).await?;
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::debug!("Failed to remove spill file {}: {}", path.display(), e);
                }
                self.stats.record_hit(CacheHit::LocalFile);
                block
            }
            ReloadSource::Durable => {
                let file_name = mo.file_name().ok_or_else(|| {
                    WorkerError::Cache("evicted matrix has no durable file".to_string())
                })?;
                let block = read_block(&self.durable_dir.join(file_name)).await?;
                self.stats.record_hit(CacheHit::Durable);
                block
            }
        };

        mo.set_residency(Residency::Resident(block));
        Ok(())
    }

    /// Eviction path: writes a resident value to a spill file in the cache directory.
    /// Pinned values and values cached while caching is inactive are left alone.
    pub async fn spill(&self, mo: &mut MatrixObject) -> Result<bool> {
        if mo.is_pinned() {
            return Ok(false);
        }
        let (cache_dir, prefix) = {
            let state = self.state.read().await;
            match (&state.cache_dir, state.active) {
                (Some(dir), true) => (dir.clone(), state.local_prefix.clone()),
                _ => return Ok(false),
            }
        };
        let Some(block) = mo.block() else {
            return Ok(false);
        };

        let path = cache_dir.join(format!("{}_{}.bin", prefix, self.next_seq()));
        write_block(&path, block).await?;
        self.stats.record_write(CacheWrite::LocalFile);
        mo.set_residency(Residency::Spilled(path));
        Ok(true)
    }

    /// Spills unpinned matrices of `ec` until at most `budget_cells` remain resident.
    /// Returns the number of matrices spilled.
    pub async fn relieve_memory_pressure(
        &self,
        ec: &mut ExecutionContext,
        budget_cells: usize,
    ) -> Result<usize> {
        let mut resident = ec.resident_cells();
        let mut spilled = 0;

        for (name, mo) in ec.matrices_mut() {
            if resident <= budget_cells {
                break;
            }
            let cells = mo.resident_cells();
            if cells > 0 && self.spill(mo).await? {
                tracing::trace!("Spilled '{}' ({} cells)", name, cells);
                resident -= cells;
                spilled += 1;
            }
        }

        if resident > budget_cells {
            tracing::debug!(
                "{} resident cells remain above budget {} (pinned values)",
                resident,
                budget_cells
            );
        }
        Ok(spilled)
    }

    /// Persists `mo` (bound to `var`) to durable storage. Clears the dirty flag.
    ///
    /// Only files written by an earlier export of this worker are overwritten. A value
    /// without one (e.g. a modified input) gets a fresh `<durable_prefix>_<var>_<seq>`
    /// name, so inputs stay intact and workers never share an output path.
    ///
    /// # Returns
    /// The durable file name the value was written to.
    pub async fn export(&self, var: &str, mo: &mut MatrixObject) -> Result<String> {
        let started = Instant::now();
        self.make_resident(mo).await?;

        let file_name = match mo.file_name() {
            Some(name) if mo.is_exported() => name.to_string(),
            _ => {
                let name = self.allocate_file_name(var).await;
                mo.set_file_name(name.clone());
                name
            }
        };

        let block = mo
            .block()
            .ok_or_else(|| WorkerError::Cache(format!("'{}' is not resident", var)))?;
        tokio::fs::create_dir_all(&self.durable_dir).await?;
        write_block(&self.durable_dir.join(&file_name), block).await?;

        mo.set_dirty(false);
        mo.set_exported(true);
        self.stats.record_write(CacheWrite::Durable);
        self.stats.record_time(CacheTimer::Export, started.elapsed());
        Ok(file_name)
    }

    /// Destroys a value that is no longer bound and removes the files it owns.
    /// Pinned values are left untouched. Returns whether the value was cleaned up.
    pub async fn cleanup_variable(&self, mut mo: MatrixObject) -> Result<bool> {
        if mo.is_pinned() {
            return Ok(false);
        }
        if let Residency::Spilled(path) = mo.residency() {
            remove_if_exists(path).await?;
        }
        if mo.is_exported() {
            if let Some(file_name) = mo.file_name() {
                remove_if_exists(&self.durable_dir.join(file_name)).await?;
            }
        }
        mo.destroy();
        Ok(true)
    }

    /// Pulls spilled values of `ec` back into memory as retained copies, so they
    /// survive removal of the cache directory. Values whose exported file is current
    /// are left spilled; they reload from durable storage.
    ///
    /// # Returns
    /// The number of values read back from their spill files.
    pub async fn preserve_spilled(&self, ec: &mut ExecutionContext) -> Result<usize> {
        let mut preserved = 0;
        for (name, mo) in ec.matrices_mut() {
            let Residency::Spilled(path) = mo.residency() else {
                continue;
            };
            if mo.is_exported() && !mo.is_dirty() {
                continue;
            }

            let path = path.clone();
            let block = read_block(&path).await?;
            remove_if_exists(&path).await?;
            self.stats.record_hit(CacheHit::LocalFile);
            mo.set_residency(Residency::Empty {
                retained: Some(block),
            });
            tracing::trace!("Preserved spilled value '{}'", name);
            preserved += 1;
        }
        Ok(preserved)
    }

    /// Moves every matrix of `ec` into the evicted-but-reconstructible state.
    pub fn mark_matrices_empty(&self, ec: &mut ExecutionContext) -> usize {
        let mut marked = 0;
        for (_, mo) in ec.matrices_mut() {
            if mo.is_destroyed() {
                continue;
            }
            if mo.set_empty_status() {
                self.stats.record_write(CacheWrite::Buffer);
            }
            marked += 1;
        }
        marked
    }

    /// Removes the cache directory and every spill file in it.
    pub async fn cleanup_cache_dir(&self) -> Result<()> {
        if let Some(dir) = self.cache_dir().await {
            remove_dir_if_exists(&dir).await?;
        }
        Ok(())
    }

    /// Deactivates caching; later spills become no-ops.
    pub async fn disable_caching(&self) {
        let mut state = self.state.write().await;
        state.active = false;
        state.cache_dir = None;
    }

    /// Removes this process's private working directory.
    pub async fn cleanup_working_directory(&self) -> Result<()> {
        let dir = self.state.write().await.working_dir.take();
        if let Some(dir) = dir {
            remove_dir_if_exists(&dir).await?;
            tracing::debug!("Removed working directory {}", dir.display());
        }
        Ok(())
    }
}

async fn read_block(path: &Path) -> Result<MatrixBlock> {
    let bytes = tokio::fs::read(path).await?;
    Ok(bincode::deserialize(&bytes)?)
}

async fn write_block(path: &Path, block: &MatrixBlock) -> Result<()> {
    let bytes = bincode::serialize(block)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
