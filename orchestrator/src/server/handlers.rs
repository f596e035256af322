//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use openapi_server::models::{
    AppendTaskRequest, AppendTaskResponse, CreateEnvironmentRequest, CreateInstallationRequest,
    EnvironmentResponse, ErrorResponse, HealthResponse, InstallationListResponse,
    InstallationResponse, InstallationSummary, TaskLogEntryResponse, TaskResponse,
    VersionResponse,
};
use tracing::error;

use crate::errors::OrchestratorError;
use crate::models::{
    Environment, EnvironmentId, Installation, InstallationId, InstallationTask, TenantId,
};
use crate::server::state::ServerState;
use crate::services::{NewEnvironment, NewTask};
use crate::utils::version_info;

impl OrchestratorError {
    fn status_code(&self) -> StatusCode {
        match self {
            OrchestratorError::EntityNotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::InvalidStateTransition(_)
            | OrchestratorError::BusinessRuleViolation(_)
            | OrchestratorError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// =================================== DTOs ======================================= //

fn environment_response(environment: Environment) -> EnvironmentResponse {
    EnvironmentResponse {
        id: environment.id.as_uuid(),
        tenant_id: environment.tenant_id.as_uuid(),
        name: environment.name,
        server_host: environment.server_host,
        connection_string: environment.connection_string,
        config: environment.config,
        installation_ids: environment
            .installation_ids
            .iter()
            .map(|id| id.as_uuid())
            .collect(),
        created_at: environment.created_at,
    }
}

fn task_response(task: &InstallationTask) -> TaskResponse {
    TaskResponse {
        id: task.id().as_uuid(),
        order: task.order(),
        name: task.name().to_string(),
        description: task.description().to_string(),
        script_ref: task.script_ref().to_string(),
        parameters: task.parameters().to_string(),
        status: task.status().to_string(),
        progress: task.progress(),
        created_at: task.created_at(),
        started_at: task.started_at(),
        completed_at: task.completed_at(),
        error_message: task.error_message().map(str::to_string),
        logs: task
            .logs()
            .iter()
            .map(|entry| TaskLogEntryResponse {
                timestamp: entry.timestamp,
                message: entry.message.clone(),
            })
            .collect(),
    }
}

fn installation_response(installation: &Installation) -> InstallationResponse {
    InstallationResponse {
        id: installation.id().as_uuid(),
        environment_id: installation.environment_id().as_uuid(),
        product_version: installation.product_version().to_string(),
        status: installation.status().to_string(),
        progress: installation.progress_percentage(),
        version: installation.version(),
        created_at: installation.created_at(),
        started_at: installation.started_at(),
        completed_at: installation.completed_at(),
        error_message: installation.error_message().map(str::to_string),
        tasks: installation.tasks().iter().map(task_response).collect(),
    }
}

// ================================== HANDLERS ===================================== //

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "rollout".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

pub async fn create_environment_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CreateEnvironmentRequest>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let environment = state
        .service
        .create_environment(NewEnvironment {
            tenant_id: TenantId::from_uuid(request.tenant_id),
            name: request.name,
            server_host: request.server_host,
            connection_string: request.connection_string,
            config: request.config,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(environment_response(environment))))
}

pub async fn environment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let id: EnvironmentId = id.parse()?;
    let environment = state.service.get_environment(id).await?;
    Ok(Json(environment_response(environment)))
}

pub async fn environment_installations_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let id: EnvironmentId = id.parse()?;
    let installations = state.service.list_installations(id).await?;

    let summaries: Vec<InstallationSummary> = installations
        .iter()
        .map(|installation| InstallationSummary {
            id: installation.id().as_uuid(),
            product_version: installation.product_version().to_string(),
            status: installation.status().to_string(),
            progress: installation.progress_percentage(),
        })
        .collect();

    Ok(Json(InstallationListResponse {
        total: summaries.len(),
        installations: summaries,
    }))
}

pub async fn create_installation_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CreateInstallationRequest>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let installation = state
        .service
        .create_installation(
            EnvironmentId::from_uuid(request.environment_id),
            &request.product_version,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(installation_response(&installation))))
}

pub async fn installation_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let id: InstallationId = id.parse()?;
    let installation = state.service.get_installation(id).await?;
    Ok(Json(installation_response(&installation)))
}

pub async fn append_task_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(request): Json<AppendTaskRequest>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let id: InstallationId = id.parse()?;
    let task_id = state
        .service
        .append_task(
            id,
            NewTask {
                name: request.name,
                description: request.description,
                script_ref: request.script_ref,
                parameters: request.parameters,
            },
        )
        .await?;

    let installation = state.service.get_installation(id).await?;
    let order = installation
        .task(task_id)
        .map(|task| task.order())
        .ok_or_else(|| OrchestratorError::Internal(format!("Task {} vanished", task_id)))?;

    Ok((
        StatusCode::CREATED,
        Json(AppendTaskResponse {
            task_id: task_id.as_uuid(),
            order,
        }),
    ))
}

pub async fn start_installation_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let id: InstallationId = id.parse()?;
    let installation = state.service.start(id).await?;
    Ok(Json(installation_response(&installation)))
}

pub async fn cancel_installation_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let id: InstallationId = id.parse()?;
    let installation = state.service.cancel(id).await?;
    Ok(Json(installation_response(&installation)))
}
