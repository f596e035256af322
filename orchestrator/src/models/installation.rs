//! Installation aggregate
//!
//! An installation owns an ordered list of tasks and is the only way to
//! mutate them. Every mutating operation returns the events it produced and
//! bumps `version` as its last step, so a store can detect lost updates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;
use crate::models::events::InstallationEvent;
use crate::models::ids::{EnvironmentId, InstallationId, TaskId};
use crate::models::task::{InstallationTask, TaskStatus};

/// Reason recorded on tasks interrupted by `cancel`
pub const CANCELLATION_REASON: &str = "Installation cancelled";

/// Installation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl InstallationStatus {
    /// Terminal statuses have no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for InstallationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Rollout of a product version onto an environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installation {
    id: InstallationId,
    environment_id: EnvironmentId,
    product_version: String,
    status: InstallationStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    tasks: Vec<InstallationTask>,
    version: u64,
}

impl Installation {
    /// Create a pending installation with no tasks
    pub fn new(
        environment_id: EnvironmentId,
        product_version: impl Into<String>,
    ) -> Result<Self, OrchestratorError> {
        let product_version = product_version.into();
        if product_version.trim().is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "Product version must not be empty".to_string(),
            ));
        }

        Ok(Self {
            id: InstallationId::new(),
            environment_id,
            product_version,
            status: InstallationStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            tasks: Vec::new(),
            version: 0,
        })
    }

    pub fn id(&self) -> InstallationId {
        self.id
    }

    pub fn environment_id(&self) -> EnvironmentId {
        self.environment_id
    }

    pub fn product_version(&self) -> &str {
        &self.product_version
    }

    pub fn status(&self) -> InstallationStatus {
        self.status
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

    /// Optimistic concurrency counter
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Tasks in ascending order
    pub fn tasks(&self) -> &[InstallationTask] {
        &self.tasks
    }

    pub fn task(&self, task_id: TaskId) -> Option<&InstallationTask> {
        self.tasks.iter().find(|t| t.id() == task_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Append a task; only allowed while pending
    pub fn append_task(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        script_ref: impl Into<String>,
        parameters: impl Into<String>,
    ) -> Result<TaskId, OrchestratorError> {
        if self.status != InstallationStatus::Pending {
            return Err(OrchestratorError::BusinessRuleViolation(format!(
                "Cannot append tasks to installation {} in status {}",
                self.id, self.status
            )));
        }

        let name = name.into();
        let script_ref = script_ref.into();
        if name.trim().is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "Task name must not be empty".to_string(),
            ));
        }
        if script_ref.trim().is_empty() {
            return Err(OrchestratorError::InvalidArgument(format!(
                "Task '{}' needs a script reference",
                name
            )));
        }

        let order = self.tasks.len() as u32 + 1;
        let task = InstallationTask::new(
            self.id,
            self.environment_id,
            name,
            description.into(),
            script_ref,
            parameters.into(),
            order,
        );
        let task_id = task.id();
        self.tasks.push(task);

        self.touch();
        Ok(task_id)
    }

    /// Move the installation from pending to running
    pub fn start(&mut self) -> Result<Vec<InstallationEvent>, OrchestratorError> {
        if self.status != InstallationStatus::Pending {
            return Err(OrchestratorError::BusinessRuleViolation(format!(
                "Installation {} cannot start from status {}",
                self.id, self.status
            )));
        }
        if self.tasks.is_empty() {
            return Err(OrchestratorError::BusinessRuleViolation(format!(
                "Installation {} has no tasks to run",
                self.id
            )));
        }

        self.status = InstallationStatus::Running;
        self.started_at = Some(Utc::now());
        self.error_message = None;

        let events = vec![InstallationEvent::InstallationStarted {
            installation_id: self.id,
            environment_id: self.environment_id,
        }];

        self.touch();
        Ok(events)
    }

    /// Mark the next pending task as running
    pub fn start_task(&mut self, task_id: TaskId) -> Result<(), OrchestratorError> {
        self.ensure_running("start a task")?;
        let index = self.task_index(task_id)?;

        let task = &self.tasks[index];
        if task.status() != TaskStatus::Pending {
            return Err(OrchestratorError::BusinessRuleViolation(format!(
                "Task '{}' is {} and cannot start",
                task.name(),
                task.status()
            )));
        }
        if let Some(running) = self.running_task() {
            return Err(OrchestratorError::BusinessRuleViolation(format!(
                "Task '{}' is still running",
                running.name()
            )));
        }
        match self.next_pending_task() {
            Some(next) if next.id() == task_id => {}
            Some(next) => {
                return Err(OrchestratorError::BusinessRuleViolation(format!(
                    "Task '{}' must run before '{}'",
                    next.name(),
                    self.tasks[index].name()
                )));
            }
            None => {}
        }

        self.tasks[index].start()?;

        self.touch();
        Ok(())
    }

    /// Forward a progress report to a running task
    pub fn report_task_progress(
        &mut self,
        task_id: TaskId,
        percent: u8,
        log_message: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        self.ensure_running("report progress")?;
        let index = self.task_index(task_id)?;
        self.tasks[index].update_progress(percent, log_message)?;

        self.touch();
        Ok(())
    }

    /// Record a successful task execution
    pub fn complete_task(
        &mut self,
        task_id: TaskId,
    ) -> Result<Vec<InstallationEvent>, OrchestratorError> {
        let index = self.running_task_index(task_id)?;
        self.tasks[index].complete()?;

        let mut events = vec![InstallationEvent::InstallationTaskCompleted {
            installation_id: self.id,
            task_id,
            status: TaskStatus::Completed,
        }];
        self.reconcile(&mut events);

        self.touch();
        Ok(events)
    }

    /// Record a failed task execution; a single failure fails the installation
    pub fn fail_task(
        &mut self,
        task_id: TaskId,
        error_message: &str,
    ) -> Result<Vec<InstallationEvent>, OrchestratorError> {
        if error_message.trim().is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "Failure reports need an error message".to_string(),
            ));
        }
        let index = self.running_task_index(task_id)?;
        self.tasks[index].fail(error_message)?;

        let task = &self.tasks[index];
        let composed = format!(
            "Task '{}' (order {}) failed: {}",
            task.name(),
            task.order(),
            error_message
        );

        let mut events = vec![InstallationEvent::InstallationTaskCompleted {
            installation_id: self.id,
            task_id,
            status: TaskStatus::Failed,
        }];

        self.status = InstallationStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(composed);
        events.push(InstallationEvent::InstallationCompleted {
            installation_id: self.id,
            success: false,
        });

        self.touch();
        Ok(events)
    }

    /// Cancel the installation, failing the running task and skipping the rest
    pub fn cancel(&mut self) -> Result<Vec<InstallationEvent>, OrchestratorError> {
        if self.is_terminal() {
            return Err(OrchestratorError::BusinessRuleViolation(format!(
                "Installation {} is already {}",
                self.id, self.status
            )));
        }

        for task in self.tasks.iter_mut() {
            match task.status() {
                TaskStatus::Running => task.fail(CANCELLATION_REASON)?,
                TaskStatus::Pending => task.skip(CANCELLATION_REASON)?,
                _ => {}
            }
        }

        self.status = InstallationStatus::Cancelled;
        self.completed_at = Some(Utc::now());

        let events = vec![InstallationEvent::InstallationCompleted {
            installation_id: self.id,
            success: false,
        }];

        self.touch();
        Ok(events)
    }

    /// Lowest-order pending task, if any
    pub fn next_pending_task(&self) -> Option<&InstallationTask> {
        self.tasks
            .iter()
            .filter(|t| t.status() == TaskStatus::Pending)
            .min_by_key(|t| t.order())
    }

    /// The task currently running, if any
    pub fn running_task(&self) -> Option<&InstallationTask> {
        self.tasks.iter().find(|t| t.status() == TaskStatus::Running)
    }

    /// Share of completed tasks, rounded to the nearest percent
    pub fn progress_percentage(&self) -> u8 {
        let total = self.tasks.len() as u64;
        if total == 0 {
            return 0;
        }
        let completed = self
            .tasks
            .iter()
            .filter(|t| t.status() == TaskStatus::Completed)
            .count() as u64;

        ((200 * completed + total) / (2 * total)) as u8
    }

    fn reconcile(&mut self, events: &mut Vec<InstallationEvent>) {
        if self.status != InstallationStatus::Running {
            return;
        }
        if !self.tasks.iter().all(|t| t.is_finished()) {
            return;
        }

        let first_failed = self
            .tasks
            .iter()
            .find(|t| t.status() == TaskStatus::Failed)
            .map(|t| format!("Task '{}' (order {}) failed", t.name(), t.order()));

        let success = first_failed.is_none();
        match first_failed {
            Some(message) => {
                self.status = InstallationStatus::Failed;
                self.error_message = Some(message);
            }
            None => self.status = InstallationStatus::Completed,
        }
        self.completed_at = Some(Utc::now());

        events.push(InstallationEvent::InstallationCompleted {
            installation_id: self.id,
            success,
        });
    }

    fn task_index(&self, task_id: TaskId) -> Result<usize, OrchestratorError> {
        self.tasks
            .iter()
            .position(|t| t.id() == task_id)
            .ok_or_else(|| {
                OrchestratorError::EntityNotFound(format!(
                    "Task {} in installation {}",
                    task_id, self.id
                ))
            })
    }

    /// Lookup followed by the guards shared by complete and fail
    fn running_task_index(&self, task_id: TaskId) -> Result<usize, OrchestratorError> {
        let index = self.task_index(task_id)?;
        if self.is_terminal() {
            return Err(OrchestratorError::BusinessRuleViolation(format!(
                "Installation {} is already {}",
                self.id, self.status
            )));
        }
        let task = &self.tasks[index];
        if task.status() != TaskStatus::Running {
            return Err(OrchestratorError::BusinessRuleViolation(format!(
                "Task '{}' is {} and cannot report an outcome",
                task.name(),
                task.status()
            )));
        }
        Ok(index)
    }

    fn ensure_running(&self, action: &str) -> Result<(), OrchestratorError> {
        if self.status != InstallationStatus::Running {
            return Err(OrchestratorError::BusinessRuleViolation(format!(
                "Cannot {} while installation {} is {}",
                action, self.id, self.status
            )));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
    }
}
