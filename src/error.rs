use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Malformed task '{input}': {reason}")]
    Decode { input: String, reason: String },

    #[error("ParFOR: failed to execute task '{task}'")]
    TaskFailed {
        task: String,
        #[source]
        source: Box<WorkerError>,
    },

    #[error("Loop body failed: {0}")]
    Execution(String),

    #[error("Worker configuration failed: {0}")]
    Configuration(#[source] Box<WorkerError>),

    #[error("Invalid program bundle: {0}")]
    Program(String),

    #[error("Variable not found: {0}")]
    UnknownVariable(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Worker is not configured")]
    NotConfigured,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    /// Wraps a decode or execution error as the single failure signal of a task.
    pub fn task_failed(task: &str, source: WorkerError) -> Self {
        WorkerError::TaskFailed {
            task: task.to_string(),
            source: Box::new(source),
        }
    }

    pub fn configuration(source: WorkerError) -> Self {
        WorkerError::Configuration(Box::new(source))
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
