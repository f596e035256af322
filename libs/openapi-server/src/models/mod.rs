//! Control API models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Error body returned with every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Create environment request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEnvironmentRequest {
    pub tenant_id: Uuid,
    pub name: String,
    pub server_host: String,
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// Environment response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub server_host: String,
    pub connection_string: Option<String>,
    pub config: BTreeMap<String, String>,
    pub installation_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Create installation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstallationRequest {
    pub environment_id: Uuid,
    pub product_version: String,
}

/// Append task request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendTaskRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub script_ref: String,
    #[serde(default)]
    pub parameters: String,
}

/// Append task response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendTaskResponse {
    pub task_id: Uuid,
    pub order: u32,
}

/// Task log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLogEntryResponse {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Task response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub order: u32,
    pub name: String,
    pub description: String,
    pub script_ref: String,
    pub parameters: String,
    pub status: String,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub logs: Vec<TaskLogEntryResponse>,
}

/// Installation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationResponse {
    pub id: Uuid,
    pub environment_id: Uuid,
    pub product_version: String,
    pub status: String,
    pub progress: u8,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub tasks: Vec<TaskResponse>,
}

/// Installation list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationListResponse {
    pub installations: Vec<InstallationSummary>,
    pub total: usize,
}

/// Installation summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationSummary {
    pub id: Uuid,
    pub product_version: String,
    pub status: String,
    pub progress: u8,
}
