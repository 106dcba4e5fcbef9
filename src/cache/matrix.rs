use crate::error::{Result, WorkerError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixMeta {
    pub rows: usize,
    pub cols: usize,
}

impl MatrixMeta {
    pub fn cells(&self) -> usize {
        self.rows * self.cols
    }
}

/// Dense, row-major matrix payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixBlock {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl MatrixBlock {
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            values: vec![value; rows * cols],
        }
    }

    pub fn meta(&self) -> MatrixMeta {
        MatrixMeta {
            rows: self.rows,
            cols: self.cols,
        }
    }

    pub fn cells(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.values.get(row * self.cols + col).copied()
    }

    /// Sets every cell of `row` to `value`.
    pub fn set_row(&mut self, row: usize, value: f64) -> Result<()> {
        if row >= self.rows {
            return Err(WorkerError::Execution(format!(
                "row index {} out of bounds for {}x{} matrix",
                row, self.rows, self.cols
            )));
        }
        let start = row * self.cols;
        self.values[start..start + self.cols].fill(value);
        Ok(())
    }

    pub fn scale(&mut self, factor: f64) {
        self.values.iter_mut().for_each(|v| *v *= factor);
    }
}

/// Where the value of a matrix currently lives.
///
/// `Resident` and `Spilled` are the normal caching states. `Empty` is the
/// evicted-but-reconstructible state entered at worker teardown: the value is
/// rebuilt from the retained copy if one survived, otherwise from durable storage.
/// `Destroyed` is terminal.
#[derive(Debug)]
pub enum Residency {
    Resident(MatrixBlock),
    Spilled(PathBuf),
    Empty { retained: Option<MatrixBlock> },
    Destroyed,
}

/// A matrix-typed variable value, managed through the [`CacheManager`](super::manager::CacheManager).
#[derive(Debug)]
pub struct MatrixObject {
    meta: MatrixMeta,
    file_name: Option<String>,
    dirty: bool,
    exported: bool,
    cleanup_enabled: bool,
    residency: Residency,
}

impl MatrixObject {
    /// An in-memory value that matches its durable copy (not dirty).
    pub fn resident(block: MatrixBlock) -> Self {
        Self {
            meta: block.meta(),
            file_name: None,
            dirty: false,
            exported: false,
            cleanup_enabled: true,
            residency: Residency::Resident(block),
        }
    }

    /// A value backed by a durable file, loaded on first acquire.
    pub fn from_durable(file_name: impl Into<String>, meta: MatrixMeta) -> Self {
        Self {
            meta,
            file_name: Some(file_name.into()),
            dirty: false,
            exported: false,
            cleanup_enabled: true,
            residency: Residency::Empty { retained: None },
        }
    }

    /// A value produced by loop-body execution. It has no file name yet and is dirty.
    pub fn derived(block: MatrixBlock, cleanup_enabled: bool) -> Self {
        Self {
            meta: block.meta(),
            file_name: None,
            dirty: true,
            exported: false,
            cleanup_enabled,
            residency: Residency::Resident(block),
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn meta(&self) -> MatrixMeta {
        self.meta
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn set_file_name(&mut self, file_name: impl Into<String>) {
        self.file_name = Some(file_name.into());
    }

    /// Points the value at an output file this worker wrote before, so the next
    /// export overwrites it instead of allocating a new name.
    pub(crate) fn adopt_output_file(&mut self, file_name: impl Into<String>) {
        self.file_name = Some(file_name.into());
        self.exported = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Whether the current file was written by this worker's export.
    pub fn is_exported(&self) -> bool {
        self.exported
    }

    pub(crate) fn set_exported(&mut self, exported: bool) {
        self.exported = exported;
    }

    /// Disabling cleanup pins the value: it is neither spilled nor deleted by the cache.
    pub fn enable_cleanup(&mut self, enabled: bool) {
        self.cleanup_enabled = enabled;
    }

    pub fn is_cleanup_enabled(&self) -> bool {
        self.cleanup_enabled
    }

    pub fn is_pinned(&self) -> bool {
        !self.cleanup_enabled
    }

    pub fn residency(&self) -> &Residency {
        &self.residency
    }

    pub(crate) fn residency_mut(&mut self) -> &mut Residency {
        &mut self.residency
    }

    pub(crate) fn set_residency(&mut self, residency: Residency) {
        if let Residency::Resident(block) = &residency {
            self.meta = block.meta();
        }
        self.residency = residency;
    }

    pub(crate) fn refresh_meta(&mut self) {
        if let Residency::Resident(block) = &self.residency {
            self.meta = block.meta();
        }
    }

    pub fn is_resident(&self) -> bool {
        matches!(self.residency, Residency::Resident(_))
    }

    pub fn is_empty_status(&self) -> bool {
        matches!(self.residency, Residency::Empty { .. })
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self.residency, Residency::Destroyed)
    }

    /// Cells currently held in memory.
    pub fn resident_cells(&self) -> usize {
        match &self.residency {
            Residency::Resident(block) => block.cells(),
            _ => 0,
        }
    }

    pub fn block(&self) -> Option<&MatrixBlock> {
        match &self.residency {
            Residency::Resident(block) => Some(block),
            _ => None,
        }
    }

    pub(crate) fn block_mut(&mut self) -> Option<&mut MatrixBlock> {
        match &mut self.residency {
            Residency::Resident(block) => Some(block),
            _ => None,
        }
    }

    /// Moves the value into the evicted-but-reconstructible state. An in-memory
    /// copy is retained so a reused worker can pick it up without reloading.
    /// Returns whether a copy was retained.
    pub fn set_empty_status(&mut self) -> bool {
        let previous = std::mem::replace(&mut self.residency, Residency::Destroyed);
        let (next, retained) = match previous {
            Residency::Resident(block) => (
                Residency::Empty {
                    retained: Some(block),
                },
                true,
            ),
            Residency::Spilled(_) => (Residency::Empty { retained: None }, false),
            Residency::Empty { retained } => {
                let kept = retained.is_some();
                (Residency::Empty { retained }, kept)
            }
            Residency::Destroyed => (Residency::Destroyed, false),
        };
        self.residency = next;
        retained
    }

    pub fn destroy(&mut self) {
        self.residency = Residency::Destroyed;
    }
}
