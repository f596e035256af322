//! Installation lifecycle events

use serde::{Deserialize, Serialize};

use crate::models::ids::{EnvironmentId, InstallationId, TaskId};
use crate::models::task::TaskStatus;

/// Event emitted by an installation transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstallationEvent {
    /// Installation moved from pending to running
    InstallationStarted {
        installation_id: InstallationId,
        environment_id: EnvironmentId,
    },

    /// A task reached completed or failed
    InstallationTaskCompleted {
        installation_id: InstallationId,
        task_id: TaskId,
        status: TaskStatus,
    },

    /// Installation reached a terminal status
    InstallationCompleted {
        installation_id: InstallationId,
        success: bool,
    },
}

impl InstallationEvent {
    /// Event name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::InstallationStarted { .. } => "installation_started",
            Self::InstallationTaskCompleted { .. } => "installation_task_completed",
            Self::InstallationCompleted { .. } => "installation_completed",
        }
    }

    pub fn installation_id(&self) -> InstallationId {
        match self {
            Self::InstallationStarted { installation_id, .. }
            | Self::InstallationTaskCompleted { installation_id, .. }
            | Self::InstallationCompleted { installation_id, .. } => *installation_id,
        }
    }
}
