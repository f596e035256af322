//! Execution gateway
//!
//! The component that actually runs a task's script. The driver loop calls
//! it; installations only ever see the reported outcome.

pub mod http;
pub mod local;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::errors::OrchestratorError;
use crate::models::{Environment, InstallationId, InstallationTask, TaskId};

pub use http::HttpExecutionGateway;
pub use local::LocalScriptGateway;

/// Everything an executor needs to run one task
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub task_id: TaskId,
    pub installation_id: InstallationId,
    pub script_ref: String,
    pub parameters: String,
    pub environment: Environment,
}

impl ExecutionRequest {
    pub fn new(task: &InstallationTask, environment: &Environment) -> Self {
        Self {
            task_id: task.id(),
            installation_id: task.installation_id(),
            script_ref: task.script_ref().to_string(),
            parameters: task.parameters().to_string(),
            environment: environment.clone(),
        }
    }
}

/// Execution phase parsed from a gateway status string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Unknown,
}

impl ExecutionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for ExecutionPhase {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let phase = match s.trim().to_lowercase().as_str() {
            "queued" | "pending" | "accepted" => Self::Queued,
            "running" | "in_progress" => Self::Running,
            "succeeded" | "success" | "completed" | "complete" => Self::Succeeded,
            "failed" | "failure" | "error" => Self::Failed,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Unknown,
        };
        Ok(phase)
    }
}

/// Status report returned by `poll_status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Raw status string as sent by the executor
    pub status: String,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl ExecutionReport {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            progress: None,
            message: None,
            error: None,
        }
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.status.parse().unwrap_or(ExecutionPhase::Unknown)
    }
}

/// Capability to start, cancel and observe script executions
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Ask the executor to run a task; `false` means it declined
    async fn start_execution(&self, request: &ExecutionRequest) -> Result<bool, OrchestratorError>;

    /// Ask the executor to stop a task; `false` means it had nothing to stop
    async fn cancel_execution(&self, task_id: TaskId) -> Result<bool, OrchestratorError>;

    async fn poll_status(&self, task_id: TaskId) -> Result<ExecutionReport, OrchestratorError>;
}
