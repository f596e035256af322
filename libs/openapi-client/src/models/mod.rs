//! Execution agent API models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Target environment handed to the agent with every execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEnvironment {
    pub environment_id: Uuid,
    pub name: String,
    pub server_host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// Start execution request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartExecutionRequest {
    pub task_id: Uuid,
    pub installation_id: Uuid,
    pub script_ref: String,
    pub parameters: String,
    pub environment: ExecutionEnvironment,
}

/// Start or cancel acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAck {
    pub accepted: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Execution status as reported by the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStatusResponse {
    pub task_id: Uuid,

    /// One of `queued`, `running`, `succeeded`, `failed`, `cancelled`
    pub status: String,

    #[serde(default)]
    pub progress: Option<u8>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    /// Agent specific details, passed through untouched
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
