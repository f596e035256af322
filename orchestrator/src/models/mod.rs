//! Domain models

pub mod environment;
pub mod events;
pub mod ids;
pub mod installation;
pub mod task;

pub use environment::Environment;
pub use events::InstallationEvent;
pub use ids::{EnvironmentId, InstallationId, TaskId, TenantId};
pub use installation::{Installation, InstallationStatus};
pub use task::{InstallationTask, TaskLogEntry, TaskStatus};
