//! Loop-Body Program
//!
//! The program bundle shipped to every worker holds the loop-body child blocks, the
//! initial variable bindings and the names of the result variables. It is JSON
//! encoded; workers treat it as opaque apart from `parse_parfor_body`.

use super::context::{Data, ExecutionContext, ScalarObject};
use crate::cache::manager::CacheManager;
use crate::cache::matrix::{MatrixBlock, MatrixMeta, MatrixObject};
use crate::error::{Result, WorkerError};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Const(f64),
    Var(String),
    Add(Box<Operand>, Box<Operand>),
    Mul(Box<Operand>, Box<Operand>),
}

impl Operand {
    pub fn evaluate(&self, ec: &ExecutionContext) -> Result<f64> {
        match self {
            Operand::Const(v) => Ok(*v),
            Operand::Var(name) => Ok(ec.scalar(name)?.as_f64()),
            Operand::Add(a, b) => Ok(a.evaluate(ec)? + b.evaluate(ec)?),
            Operand::Mul(a, b) => Ok(a.evaluate(ec)? * b.evaluate(ec)?),
        }
    }
}

/// One child block of the loop body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ProgramBlock {
    /// `target = value`
    Assign { target: String, value: Operand },
    /// `target = target + value`; an unbound target starts at zero.
    Accumulate { target: String, value: Operand },
    /// `target[index, ] = value`, producing a new matrix object (copy on write).
    IndexedWrite {
        target: String,
        index: Operand,
        value: Operand,
    },
    /// `target = target * factor`, in place.
    Scale { target: String, factor: Operand },
}

impl ProgramBlock {
    pub fn target(&self) -> &str {
        match self {
            ProgramBlock::Assign { target, .. }
            | ProgramBlock::Accumulate { target, .. }
            | ProgramBlock::IndexedWrite { target, .. }
            | ProgramBlock::Scale { target, .. } => target,
        }
    }

    pub async fn execute(&self, ec: &mut ExecutionContext, cache: &CacheManager) -> Result<()> {
        match self {
            ProgramBlock::Assign { target, value } => {
                let value = value.evaluate(ec)?;
                ec.set_scalar(target, ScalarObject::Double(value));
            }
            ProgramBlock::Accumulate { target, value } => {
                let value = value.evaluate(ec)?;
                let current = match ec.get(target) {
                    Some(_) => ec.scalar(target)?.as_f64(),
                    None => 0.0,
                };
                ec.set_scalar(target, ScalarObject::Double(current + value));
            }
            ProgramBlock::IndexedWrite {
                target,
                index,
                value,
            } => {
                let row = row_index(index.evaluate(ec)?)?;
                let value = value.evaluate(ec)?;

                let current = ec.matrix_mut(target)?;
                let cleanup_enabled = current.is_cleanup_enabled();
                let mut block = cache.acquire_read(current).await?.clone();
                cache.release(current);
                block.set_row(row, value)?;

                let derived = MatrixObject::derived(block, cleanup_enabled);
                if let Some(Data::Matrix(previous)) = ec.set(target, Data::Matrix(derived)) {
                    cache.cleanup_variable(previous).await?;
                }
            }
            ProgramBlock::Scale { target, factor } => {
                let factor = factor.evaluate(ec)?;
                let mo = ec.matrix_mut(target)?;
                cache.acquire_modify(mo).await?.scale(factor);
                cache.release(mo);
            }
        }
        Ok(())
    }
}

fn row_index(value: f64) -> Result<usize> {
    if value < 0.0 || value.fract() != 0.0 {
        return Err(WorkerError::Execution(format!(
            "invalid row index {}",
            value
        )));
    }
    Ok(value as usize)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixSpec {
    pub rows: usize,
    pub cols: usize,
    /// Generate the value in memory with every cell set to `fill`.
    #[serde(default)]
    pub fill: Option<f64>,
    /// Durable file backing the value; required when `fill` is absent.
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableSpec {
    Scalar(f64),
    Matrix(MatrixSpec),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramBundle {
    #[serde(default)]
    pub variables: BTreeMap<String, VariableSpec>,
    #[serde(default)]
    pub blocks: Vec<ProgramBlock>,
    #[serde(default)]
    pub result_vars: Vec<String>,
}

impl ProgramBundle {
    pub fn to_source(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decoded loop body of one worker.
#[derive(Debug)]
pub struct ParForBody {
    pub child_blocks: Arc<Vec<ProgramBlock>>,
    pub ec: ExecutionContext,
    pub result_vars: Vec<String>,
}

pub fn parse_parfor_body(source: &str) -> Result<ParForBody> {
    let bundle: ProgramBundle = serde_json::from_str(source)?;

    let mut ec = ExecutionContext::new();
    for (name, spec) in &bundle.variables {
        let data = match spec {
            VariableSpec::Scalar(v) => Data::Scalar(ScalarObject::Double(*v)),
            VariableSpec::Matrix(m) => Data::Matrix(matrix_from_spec(name, m)?),
        };
        ec.set(name, data);
    }

    let assigned: HashSet<&str> = bundle.blocks.iter().map(ProgramBlock::target).collect();
    let mut seen = HashSet::new();
    let mut result_vars = Vec::new();
    for var in &bundle.result_vars {
        if !ec.contains(var) && !assigned.contains(var.as_str()) {
            return Err(WorkerError::Program(format!(
                "result variable '{}' is neither declared nor assigned",
                var
            )));
        }
        if seen.insert(var.as_str()) {
            result_vars.push(var.clone());
        }
    }

    Ok(ParForBody {
        child_blocks: Arc::new(bundle.blocks),
        ec,
        result_vars,
    })
}

fn matrix_from_spec(name: &str, spec: &MatrixSpec) -> Result<MatrixObject> {
    let mo = match (spec.fill, &spec.file_name) {
        (Some(fill), file_name) => {
            let mo = MatrixObject::resident(MatrixBlock::filled(spec.rows, spec.cols, fill));
            match file_name {
                Some(f) => mo.with_file_name(f.clone()),
                None => mo,
            }
        }
        (None, Some(file_name)) => MatrixObject::from_durable(
            file_name.clone(),
            MatrixMeta {
                rows: spec.rows,
                cols: spec.cols,
            },
        ),
        (None, None) => {
            return Err(WorkerError::Program(format!(
                "matrix '{}' needs either a fill value or a file name",
                name
            )));
        }
    };
    Ok(mo)
}
