use super::protocol::*;
use super::service::WorkerService;
use super::types::ConfigureOutcome;
use crate::error::WorkerError;

use axum::{Extension, Json, http::StatusCode};
use std::error::Error;
use std::sync::Arc;

pub async fn handle_configure(
    Extension(service): Extension<Arc<WorkerService>>,
    Json(req): Json<ConfigureRequest>,
) -> (StatusCode, Json<ConfigureResponse>) {
    match service
        .configure(&req.job_id, &req.task_id, &req.program)
        .await
    {
        Ok((slot_id, outcome)) => (
            StatusCode::OK,
            Json(ConfigureResponse {
                slot_id,
                restored: outcome == ConfigureOutcome::Restored,
            }),
        ),
        Err(e) => {
            // Process-wide cache state may be half initialized
            tracing::error!("{}", error_chain(&e));
            std::process::exit(1);
        }
    }
}

pub async fn handle_execute(
    Extension(service): Extension<Arc<WorkerService>>,
    Json(req): Json<ExecuteRequest>,
) -> (StatusCode, Json<ExecuteResponse>) {
    match service.execute(&req.slot_id, &req.task).await {
        Ok(report) => (
            StatusCode::OK,
            Json(ExecuteResponse {
                report: Some(report),
                error: None,
            }),
        ),
        Err(e) => {
            let status = match e {
                WorkerError::NotConfigured => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let message = error_chain(&e);
            tracing::error!("Slot {}: {}", req.slot_id, message);
            (
                status,
                Json(ExecuteResponse {
                    report: None,
                    error: Some(message),
                }),
            )
        }
    }
}

pub async fn handle_close(
    Extension(service): Extension<Arc<WorkerService>>,
    Json(req): Json<CloseRequest>,
) -> (StatusCode, Json<CloseResponse>) {
    if service.close(&req.slot_id).await {
        (StatusCode::OK, Json(CloseResponse { closed: true }))
    } else {
        (StatusCode::NOT_FOUND, Json(CloseResponse { closed: false }))
    }
}

pub async fn handle_registry(
    Extension(service): Extension<Arc<WorkerService>>,
) -> (StatusCode, Json<RegistryResponse>) {
    let workers = service.registry_entries().await;
    (StatusCode::OK, Json(RegistryResponse { workers }))
}

/// Renders an error with all of its sources, outermost first.
pub fn error_chain(e: &WorkerError) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
