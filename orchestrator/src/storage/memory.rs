//! In-memory store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::OrchestratorError;
use crate::models::{Environment, EnvironmentId, Installation, InstallationId, InstallationStatus};
use crate::storage::repository::{
    check_version, environment_not_found, installation_not_found, EnvironmentRepository,
    InstallationRepository,
};

/// Store keeping everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    installations: RwLock<HashMap<InstallationId, Installation>>,
    environments: RwLock<HashMap<EnvironmentId, Environment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn filter_installations<F>(&self, predicate: F) -> Vec<Installation>
    where
        F: Fn(&Installation) -> bool,
    {
        let installations = self.installations.read().await;
        let mut matching: Vec<Installation> = installations
            .values()
            .filter(|&i| predicate(i))
            .cloned()
            .collect();
        matching.sort_by_key(|i| i.created_at());
        matching
    }
}

#[async_trait]
impl InstallationRepository for MemoryStore {
    async fn get_installation(&self, id: InstallationId) -> Result<Installation, OrchestratorError> {
        let installations = self.installations.read().await;
        installations
            .get(&id)
            .cloned()
            .ok_or_else(|| installation_not_found(id))
    }

    async fn add_installation(&self, installation: &Installation) -> Result<(), OrchestratorError> {
        let mut installations = self.installations.write().await;
        if installations.contains_key(&installation.id()) {
            return Err(OrchestratorError::StorageError(format!(
                "Installation {} already exists",
                installation.id()
            )));
        }
        installations.insert(installation.id(), installation.clone());
        Ok(())
    }

    async fn update_installation(
        &self,
        installation: &Installation,
        expected_version: u64,
    ) -> Result<(), OrchestratorError> {
        let mut installations = self.installations.write().await;
        let stored = installations
            .get(&installation.id())
            .ok_or_else(|| installation_not_found(installation.id()))?;
        check_version(stored, installation, expected_version)?;
        installations.insert(installation.id(), installation.clone());
        Ok(())
    }

    async fn list_installations_by_environment(
        &self,
        environment_id: EnvironmentId,
    ) -> Result<Vec<Installation>, OrchestratorError> {
        Ok(self
            .filter_installations(|i| i.environment_id() == environment_id)
            .await)
    }

    async fn list_installations_by_status(
        &self,
        status: InstallationStatus,
    ) -> Result<Vec<Installation>, OrchestratorError> {
        Ok(self.filter_installations(|i| i.status() == status).await)
    }
}

#[async_trait]
impl EnvironmentRepository for MemoryStore {
    async fn get_environment(&self, id: EnvironmentId) -> Result<Environment, OrchestratorError> {
        let environments = self.environments.read().await;
        environments
            .get(&id)
            .cloned()
            .ok_or_else(|| environment_not_found(id))
    }

    async fn save_environment(&self, environment: &Environment) -> Result<(), OrchestratorError> {
        let mut environments = self.environments.write().await;
        environments.insert(environment.id, environment.clone());
        Ok(())
    }

    async fn list_environments(&self) -> Result<Vec<Environment>, OrchestratorError> {
        let environments = self.environments.read().await;
        let mut all: Vec<Environment> = environments.values().cloned().collect();
        all.sort_by_key(|e| e.created_at);
        Ok(all)
    }
}
