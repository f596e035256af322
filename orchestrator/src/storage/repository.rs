//! Persistence boundaries
//!
//! Installations are stored whole, tasks included. `update_installation`
//! takes the version the caller loaded and refuses to overwrite a newer
//! document.

use async_trait::async_trait;

use crate::errors::OrchestratorError;
use crate::models::{Environment, EnvironmentId, Installation, InstallationId, InstallationStatus};

#[async_trait]
pub trait InstallationRepository: Send + Sync {
    /// Load an installation with its tasks
    async fn get_installation(&self, id: InstallationId) -> Result<Installation, OrchestratorError>;

    /// Store a new installation
    async fn add_installation(&self, installation: &Installation) -> Result<(), OrchestratorError>;

    /// Replace a stored installation if nobody saved it since `expected_version`
    async fn update_installation(
        &self,
        installation: &Installation,
        expected_version: u64,
    ) -> Result<(), OrchestratorError>;

    /// Installations of one environment, oldest first
    async fn list_installations_by_environment(
        &self,
        environment_id: EnvironmentId,
    ) -> Result<Vec<Installation>, OrchestratorError>;

    /// Installations in a given status, oldest first
    async fn list_installations_by_status(
        &self,
        status: InstallationStatus,
    ) -> Result<Vec<Installation>, OrchestratorError>;
}

#[async_trait]
pub trait EnvironmentRepository: Send + Sync {
    async fn get_environment(&self, id: EnvironmentId) -> Result<Environment, OrchestratorError>;

    /// Insert or replace an environment
    async fn save_environment(&self, environment: &Environment) -> Result<(), OrchestratorError>;

    async fn list_environments(&self) -> Result<Vec<Environment>, OrchestratorError>;
}

/// Everything the service layer needs from a store
pub trait Store: InstallationRepository + EnvironmentRepository {}

impl<T: InstallationRepository + EnvironmentRepository> Store for T {}

pub(crate) fn installation_not_found(id: InstallationId) -> OrchestratorError {
    OrchestratorError::EntityNotFound(format!("Installation {}", id))
}

pub(crate) fn environment_not_found(id: EnvironmentId) -> OrchestratorError {
    OrchestratorError::EntityNotFound(format!("Environment {}", id))
}

/// Optimistic concurrency check shared by the stores
pub(crate) fn check_version(
    stored: &Installation,
    incoming: &Installation,
    expected_version: u64,
) -> Result<(), OrchestratorError> {
    if stored.version() != expected_version {
        return Err(OrchestratorError::ConcurrencyConflict(format!(
            "Installation {} is at version {}, expected {}",
            stored.id(),
            stored.version(),
            expected_version
        )));
    }
    if incoming.version() < expected_version {
        return Err(OrchestratorError::ConcurrencyConflict(format!(
            "Installation {} version went backwards ({} < {})",
            incoming.id(),
            incoming.version(),
            expected_version
        )));
    }
    Ok(())
}
