//! Network Protocol Definitions
//!
//! DTOs for hosting worker slots behind HTTP, so the batch framework can schedule
//! many task slots into one long-lived worker process.

use super::types::*;
use serde::{Deserialize, Serialize};

pub const ENDPOINT_CONFIGURE: &str = "/worker/configure";
pub const ENDPOINT_EXECUTE: &str = "/worker/execute";
pub const ENDPOINT_CLOSE: &str = "/worker/close";
pub const ENDPOINT_REGISTRY: &str = "/worker/registry";

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigureRequest {
    pub job_id: JobId,
    pub task_id: String,
    /// Serialized loop body (program bundle).
    pub program: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigureResponse {
    pub slot_id: String,
    pub restored: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub slot_id: String,
    pub task: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub report: Option<TaskReport>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CloseRequest {
    pub slot_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CloseResponse {
    pub closed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegistryResponse {
    pub workers: Vec<RegistryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub job_id: JobId,
    pub state: WorkerStateSnapshot,
}
