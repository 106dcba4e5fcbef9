use crate::cache::matrix::MatrixObject;
use crate::error::{Result, WorkerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScalarObject {
    Int(i64),
    Double(f64),
}

impl ScalarObject {
    pub fn as_f64(&self) -> f64 {
        match self {
            ScalarObject::Int(v) => *v as f64,
            ScalarObject::Double(v) => *v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Scalar,
    Matrix,
}

/// A value bound in the symbol table.
#[derive(Debug)]
pub enum Data {
    Scalar(ScalarObject),
    Matrix(MatrixObject),
}

impl Data {
    pub fn data_type(&self) -> DataType {
        match self {
            Data::Scalar(_) => DataType::Scalar,
            Data::Matrix(_) => DataType::Matrix,
        }
    }

    pub fn as_matrix(&self) -> Option<&MatrixObject> {
        match self {
            Data::Matrix(mo) => Some(mo),
            Data::Scalar(_) => None,
        }
    }

    pub fn as_matrix_mut(&mut self) -> Option<&mut MatrixObject> {
        match self {
            Data::Matrix(mo) => Some(mo),
            Data::Scalar(_) => None,
        }
    }
}

/// Symbol table of one loop-body instance.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    variables: BTreeMap<String, Data>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Data> {
        self.variables.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Data> {
        self.variables.get_mut(name)
    }

    /// Binds `name`, returning the value it replaces.
    pub fn set(&mut self, name: &str, data: Data) -> Option<Data> {
        self.variables.insert(name.to_string(), data)
    }

    pub fn set_scalar(&mut self, name: &str, value: ScalarObject) -> Option<Data> {
        self.set(name, Data::Scalar(value))
    }

    pub fn remove(&mut self, name: &str) -> Option<Data> {
        self.variables.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    pub fn scalar(&self, name: &str) -> Result<ScalarObject> {
        match self.variables.get(name) {
            Some(Data::Scalar(value)) => Ok(*value),
            Some(Data::Matrix(_)) => Err(WorkerError::Execution(format!(
                "variable '{}' is a matrix, expected a scalar",
                name
            ))),
            None => Err(WorkerError::UnknownVariable(name.to_string())),
        }
    }

    pub fn matrix(&self, name: &str) -> Result<&MatrixObject> {
        match self.variables.get(name) {
            Some(Data::Matrix(mo)) => Ok(mo),
            Some(Data::Scalar(_)) => Err(WorkerError::Execution(format!(
                "variable '{}' is a scalar, expected a matrix",
                name
            ))),
            None => Err(WorkerError::UnknownVariable(name.to_string())),
        }
    }

    pub fn matrix_mut(&mut self, name: &str) -> Result<&mut MatrixObject> {
        match self.variables.get_mut(name) {
            Some(Data::Matrix(mo)) => Ok(mo),
            Some(Data::Scalar(_)) => Err(WorkerError::Execution(format!(
                "variable '{}' is a scalar, expected a matrix",
                name
            ))),
            None => Err(WorkerError::UnknownVariable(name.to_string())),
        }
    }

    pub fn matrices_mut(&mut self) -> impl Iterator<Item = (&String, &mut MatrixObject)> {
        self.variables
            .iter_mut()
            .filter_map(|(name, data)| data.as_matrix_mut().map(|mo| (name, mo)))
    }

    /// Total matrix cells currently held in memory.
    pub fn resident_cells(&self) -> usize {
        self.variables
            .values()
            .filter_map(Data::as_matrix)
            .map(MatrixObject::resident_cells)
            .sum()
    }
}
