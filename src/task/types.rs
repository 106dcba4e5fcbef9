use crate::error::{Result, WorkerError};
use serde::{Deserialize, Serialize};

/// Which loop iterations a task covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Iterations {
    /// `start..end` in increments of `step`; `end` is exclusive and `step` is never zero.
    Range { start: i64, end: i64, step: i64 },
    /// Explicit iteration indices, executed in the given order.
    Set(Vec<i64>),
}

/// One unit of loop-body work. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    owner: Option<String>,
    iter_var: String,
    iterations: Iterations,
}

impl Task {
    pub fn range(iter_var: &str, start: i64, end: i64, step: i64) -> Result<Self> {
        if step == 0 {
            return Err(WorkerError::Decode {
                input: format!("{},{},{}", start, end, step),
                reason: "range step must not be zero".to_string(),
            });
        }
        Ok(Self {
            owner: None,
            iter_var: iter_var.to_string(),
            iterations: Iterations::Range { start, end, step },
        })
    }

    pub fn set(iter_var: &str, indices: Vec<i64>) -> Result<Self> {
        if indices.is_empty() {
            return Err(WorkerError::Decode {
                input: String::new(),
                reason: "iteration set must not be empty".to_string(),
            });
        }
        Ok(Self {
            owner: None,
            iter_var: iter_var.to_string(),
            iterations: Iterations::Set(indices),
        })
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Task identity this task was issued for, if the descriptor carried one.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn iter_var(&self) -> &str {
        &self.iter_var
    }

    pub fn designation(&self) -> &Iterations {
        &self.iterations
    }

    pub fn iterations(&self) -> Box<dyn Iterator<Item = i64> + Send + '_> {
        match &self.iterations {
            Iterations::Range { start, end, step } => {
                let (end, step) = (*end, *step);
                Box::new(
                    std::iter::successors(Some(*start), move |i| i.checked_add(step))
                        .take_while(move |i| if step > 0 { *i < end } else { *i > end }),
                )
            }
            Iterations::Set(indices) => Box::new(indices.iter().copied()),
        }
    }

    /// Number of iterations designated by this task.
    pub fn len(&self) -> usize {
        match &self.iterations {
            Iterations::Range { start, end, step } => {
                let (start, end, step) = (*start as i128, *end as i128, *step as i128);
                let span = if step > 0 { end - start } else { start - end };
                if span <= 0 {
                    0
                } else {
                    ((span - 1) / step.abs() + 1) as usize
                }
            }
            Iterations::Set(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical tagged form, e.g. `RANGE.i.{0,10,1}` or `task_7|SET.k.{1,4,9}`.
    pub fn to_compact_string(&self) -> String {
        let body = match &self.iterations {
            Iterations::Range { start, end, step } => {
                format!("RANGE.{}.{{{},{},{}}}", self.iter_var, start, end, step)
            }
            Iterations::Set(indices) => {
                let list: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
                format!("SET.{}.{{{}}}", self.iter_var, list.join(","))
            }
        };

        match &self.owner {
            Some(owner) => format!("{}|{}", owner, body),
            None => body,
        }
    }
}
