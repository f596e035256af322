//! Installation task entity and its state machine

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;
use crate::models::ids::{EnvironmentId, InstallationId, TaskId};

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not yet started
    Pending,

    /// In progress
    Running,

    /// Succeeded
    Completed,

    /// Errored
    Failed,

    /// Never ran, short-circuited by cancellation
    Skipped,
}

impl TaskStatus {
    /// True once the task can no longer change
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Task transition request
#[derive(Debug, Clone, Copy)]
enum TaskEvent {
    Start,
    Complete,
    Fail,
    Skip,
}

/// A timestamped line of the task log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// A named, ordered step of an installation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationTask {
    id: TaskId,
    installation_id: InstallationId,
    environment_id: EnvironmentId,
    name: String,
    description: String,
    script_ref: String,
    parameters: String,
    order: u32,
    status: TaskStatus,
    progress: u8,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    logs: Vec<TaskLogEntry>,
}

impl InstallationTask {
    /// Only the owning installation creates tasks, so `order` is trusted here.
    pub(crate) fn new(
        installation_id: InstallationId,
        environment_id: EnvironmentId,
        name: String,
        description: String,
        script_ref: String,
        parameters: String,
        order: u32,
    ) -> Self {
        Self {
            id: TaskId::new(),
            installation_id,
            environment_id,
            name,
            description,
            script_ref,
            parameters,
            order,
            status: TaskStatus::Pending,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            logs: Vec::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn installation_id(&self) -> InstallationId {
        self.installation_id
    }

    pub fn environment_id(&self) -> EnvironmentId {
        self.environment_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn script_ref(&self) -> &str {
        &self.script_ref
    }

    pub fn parameters(&self) -> &str {
        &self.parameters
    }

    /// 1-based position inside the installation
    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn logs(&self) -> &[TaskLogEntry] {
        &self.logs
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    fn next_status(&self, event: TaskEvent) -> Result<TaskStatus, OrchestratorError> {
        let next = match (self.status, event) {
            (TaskStatus::Pending, TaskEvent::Start) => TaskStatus::Running,
            (TaskStatus::Pending, TaskEvent::Skip) => TaskStatus::Skipped,
            (TaskStatus::Running, TaskEvent::Complete) => TaskStatus::Completed,
            (TaskStatus::Running, TaskEvent::Fail) => TaskStatus::Failed,
            (status, event) => {
                return Err(OrchestratorError::InvalidStateTransition(format!(
                    "Task '{}' cannot {:?} from {}",
                    self.name, event, status
                )));
            }
        };
        Ok(next)
    }

    fn log(&mut self, message: impl Into<String>) {
        self.logs.push(TaskLogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    pub(crate) fn start(&mut self) -> Result<(), OrchestratorError> {
        self.status = self.next_status(TaskEvent::Start)?;
        self.started_at = Some(Utc::now());
        self.progress = 0;
        self.error_message = None;
        Ok(())
    }

    pub(crate) fn update_progress(
        &mut self,
        percent: u8,
        log_message: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        if self.status != TaskStatus::Running {
            return Err(OrchestratorError::InvalidStateTransition(format!(
                "Task '{}' cannot report progress from {}",
                self.name, self.status
            )));
        }
        if percent > 100 {
            return Err(OrchestratorError::InvalidArgument(format!(
                "Progress must be within 0..=100, got {}",
                percent
            )));
        }

        self.progress = percent;
        if let Some(message) = log_message.filter(|m| !m.is_empty()) {
            self.log(message);
        }
        Ok(())
    }

    pub(crate) fn complete(&mut self) -> Result<(), OrchestratorError> {
        self.status = self.next_status(TaskEvent::Complete)?;
        self.completed_at = Some(Utc::now());
        self.progress = 100;
        self.log("Task completed successfully");
        Ok(())
    }

    pub(crate) fn fail(&mut self, error_message: &str) -> Result<(), OrchestratorError> {
        self.status = self.next_status(TaskEvent::Fail)?;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(error_message.to_string());
        self.log(format!("Task failed: {}", error_message));
        Ok(())
    }

    pub(crate) fn skip(&mut self, reason: &str) -> Result<(), OrchestratorError> {
        self.status = self.next_status(TaskEvent::Skip)?;
        self.completed_at = Some(Utc::now());
        self.log(format!("Task skipped: {}", reason));
        Ok(())
    }
}
