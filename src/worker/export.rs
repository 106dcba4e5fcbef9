//! Result Exporter
//!
//! After the iterations of a task, every result variable that was modified is written
//! to durable storage and reported as one record keyed by the worker id. Unmodified
//! values are not exported again, which keeps the merge input small under reuse.

use super::types::*;
use crate::cache::manager::CacheManager;
use crate::error::{Result, WorkerError};
use crate::runtime::context::Data;

use std::fmt;
use std::str::FromStr;

pub const DESCRIPTOR_DELIMITER: char = '\u{00b7}';
pub const MATRIX_TAG: &str = "MATRIX";

/// Serialized description of an exported result variable, as read by the merge stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultDescriptor {
    pub name: String,
    pub file_name: String,
    pub rows: usize,
    pub cols: usize,
}

impl fmt::Display for ResultDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = DESCRIPTOR_DELIMITER;
        write!(
            f,
            "{}{d}{}{d}{}{d}{}{d}{}",
            self.name, MATRIX_TAG, self.file_name, self.rows, self.cols
        )
    }
}

impl FromStr for ResultDescriptor {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = |reason: &str| WorkerError::Decode {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = s.split(DESCRIPTOR_DELIMITER).collect();
        let [name, tag, file_name, rows, cols] = parts.as_slice() else {
            return Err(malformed("expected 5 descriptor fields"));
        };
        if *tag != MATRIX_TAG {
            return Err(malformed("unsupported data type"));
        }

        Ok(Self {
            name: name.to_string(),
            file_name: file_name.to_string(),
            rows: rows.parse::<usize>().map_err(|_| malformed("invalid row count"))?,
            cols: cols.parse::<usize>().map_err(|_| malformed("invalid column count"))?,
        })
    }
}

pub struct ResultExporter<'a> {
    cache: &'a CacheManager,
    reuse_workers: bool,
}

impl<'a> ResultExporter<'a> {
    pub fn new(cache: &'a CacheManager, reuse_workers: bool) -> Self {
        Self {
            cache,
            reuse_workers,
        }
    }

    /// Exports every dirty matrix-typed result variable of `state`.
    ///
    /// With reuse enabled, a variable exported before is written back to the same
    /// file name, so the merge stage sees one stable output file per worker.
    pub async fn export(&self, state: &mut WorkerState) -> Result<Vec<OutputRecord>> {
        let key = u64::from(state.identity.worker_id);
        let mut records = Vec::new();

        for var in &state.result_vars {
            let mo = match state.ec.get_mut(var) {
                Some(Data::Matrix(mo)) => mo,
                Some(Data::Scalar(_)) => continue,
                None => {
                    tracing::warn!("Result variable '{}' is not bound, skipping export", var);
                    continue;
                }
            };
            if !mo.is_dirty() {
                continue;
            }

            if self.reuse_workers {
                if let Some(previous) = state.file_names.get(var) {
                    mo.adopt_output_file(previous.clone());
                }
            }

            let file_name = self.cache.export(var, mo).await?;
            let meta = mo.meta();
            if self.reuse_workers {
                state.file_names.insert(var.clone(), file_name.clone());
            }

            let descriptor = ResultDescriptor {
                name: var.clone(),
                file_name,
                rows: meta.rows,
                cols: meta.cols,
            };
            tracing::debug!("Exported result variable {}", descriptor);
            records.push(OutputRecord {
                key,
                value: descriptor.to_string(),
            });
        }

        Ok(records)
    }
}
