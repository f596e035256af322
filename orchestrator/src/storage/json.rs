//! JSON file store
//!
//! One document per installation under `installations/<id>.json` and one
//! per environment under `environments/<id>.json`. Writes go through a
//! temporary file and a rename.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::OrchestratorError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::{Environment, EnvironmentId, Installation, InstallationId, InstallationStatus};
use crate::storage::layout::StorageLayout;
use crate::storage::repository::{
    check_version, environment_not_found, installation_not_found, EnvironmentRepository,
    InstallationRepository,
};

/// Store persisting JSON documents under a storage layout
pub struct JsonStore {
    installations_dir: Dir,
    environments_dir: Dir,
    // serialises check-then-write sequences inside this process
    write_lock: Mutex<()>,
}

impl JsonStore {
    /// Open a store, creating its directories
    pub async fn open(layout: &StorageLayout) -> Result<Self, OrchestratorError> {
        let store = Self {
            installations_dir: layout.installations_dir(),
            environments_dir: layout.environments_dir(),
            write_lock: Mutex::new(()),
        };
        store.installations_dir.create().await?;
        store.environments_dir.create().await?;
        Ok(store)
    }

    fn installation_file(&self, id: InstallationId) -> File {
        self.installations_dir.file(&format!("{}.json", id))
    }

    fn environment_file(&self, id: EnvironmentId) -> File {
        self.environments_dir.file(&format!("{}.json", id))
    }

    async fn read_installations(&self) -> Result<Vec<Installation>, OrchestratorError> {
        let mut installations = Vec::new();
        for file in self.installations_dir.list_files("json").await? {
            match file.read_json::<Installation>().await {
                Ok(installation) => installations.push(installation),
                Err(e) => warn!("Skipping unreadable installation {:?}: {}", file.path(), e),
            }
        }
        installations.sort_by_key(|i| i.created_at());
        Ok(installations)
    }
}

#[async_trait]
impl InstallationRepository for JsonStore {
    async fn get_installation(&self, id: InstallationId) -> Result<Installation, OrchestratorError> {
        let file = self.installation_file(id);
        if !file.exists().await {
            return Err(installation_not_found(id));
        }
        file.read_json().await
    }

    async fn add_installation(&self, installation: &Installation) -> Result<(), OrchestratorError> {
        let _guard = self.write_lock.lock().await;
        let file = self.installation_file(installation.id());
        if file.exists().await {
            return Err(OrchestratorError::StorageError(format!(
                "Installation {} already exists",
                installation.id()
            )));
        }
        debug!("Writing installation {} to {:?}", installation.id(), file.path());
        file.write_json(installation).await
    }

    async fn update_installation(
        &self,
        installation: &Installation,
        expected_version: u64,
    ) -> Result<(), OrchestratorError> {
        let _guard = self.write_lock.lock().await;
        let file = self.installation_file(installation.id());
        if !file.exists().await {
            return Err(installation_not_found(installation.id()));
        }
        let stored: Installation = file.read_json().await?;
        check_version(&stored, installation, expected_version)?;
        file.write_json(installation).await
    }

    async fn list_installations_by_environment(
        &self,
        environment_id: EnvironmentId,
    ) -> Result<Vec<Installation>, OrchestratorError> {
        let mut installations = self.read_installations().await?;
        installations.retain(|i| i.environment_id() == environment_id);
        Ok(installations)
    }

    async fn list_installations_by_status(
        &self,
        status: InstallationStatus,
    ) -> Result<Vec<Installation>, OrchestratorError> {
        let mut installations = self.read_installations().await?;
        installations.retain(|i| i.status() == status);
        Ok(installations)
    }
}

#[async_trait]
impl EnvironmentRepository for JsonStore {
    async fn get_environment(&self, id: EnvironmentId) -> Result<Environment, OrchestratorError> {
        let file = self.environment_file(id);
        if !file.exists().await {
            return Err(environment_not_found(id));
        }
        file.read_json().await
    }

    async fn save_environment(&self, environment: &Environment) -> Result<(), OrchestratorError> {
        let _guard = self.write_lock.lock().await;
        self.environment_file(environment.id).write_json(environment).await
    }

    async fn list_environments(&self) -> Result<Vec<Environment>, OrchestratorError> {
        let mut environments = Vec::new();
        for file in self.environments_dir.list_files("json").await? {
            match file.read_json::<Environment>().await {
                Ok(environment) => environments.push(environment),
                Err(e) => warn!("Skipping unreadable environment {:?}: {}", file.path(), e),
            }
        }
        environments.sort_by_key(|e| e.created_at);
        Ok(environments)
    }
}
