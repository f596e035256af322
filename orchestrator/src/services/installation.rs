//! Installation service
//!
//! Entry point for anything that changes an installation. Each mutation runs
//! under a per-installation lock: load, apply the aggregate operation, save
//! against the loaded version, then publish the produced events.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::OrchestratorError;
use crate::models::{
    Environment, EnvironmentId, Installation, InstallationEvent, InstallationId,
    InstallationStatus, InstallationTask, TaskId, TenantId,
};
use crate::notify::EventNotifier;
use crate::storage::Store;

/// Input for a new environment
#[derive(Debug, Clone, Default)]
pub struct NewEnvironment {
    pub tenant_id: TenantId,
    pub name: String,
    pub server_host: String,
    pub connection_string: Option<String>,
    pub config: BTreeMap<String, String>,
}

/// Input for a new task
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub name: String,
    pub description: String,
    pub script_ref: String,
    pub parameters: String,
}

/// Orchestrating caller API over the installation store
pub struct InstallationService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn EventNotifier>,
    locks: StdMutex<HashMap<InstallationId, Arc<Mutex<()>>>>,
    environment_lock: Mutex<()>,
}

impl InstallationService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn EventNotifier>) -> Self {
        Self {
            store,
            notifier,
            locks: StdMutex::new(HashMap::new()),
            environment_lock: Mutex::new(()),
        }
    }

    // ============================== ENVIRONMENTS ================================ //

    pub async fn create_environment(
        &self,
        input: NewEnvironment,
    ) -> Result<Environment, OrchestratorError> {
        let mut environment = Environment::new(input.tenant_id, input.name, input.server_host)?
            .with_config(input.config);
        if let Some(connection_string) = input.connection_string {
            environment = environment.with_connection_string(connection_string);
        }

        self.store.save_environment(&environment).await?;
        info!("Created environment {} ({})", environment.name, environment.id);
        Ok(environment)
    }

    pub async fn get_environment(&self, id: EnvironmentId) -> Result<Environment, OrchestratorError> {
        self.store.get_environment(id).await
    }

    pub async fn list_environments(&self) -> Result<Vec<Environment>, OrchestratorError> {
        self.store.list_environments().await
    }

    // ============================== INSTALLATIONS =============================== //

    /// Create a pending installation and register it on its environment
    pub async fn create_installation(
        &self,
        environment_id: EnvironmentId,
        product_version: &str,
    ) -> Result<Installation, OrchestratorError> {
        let _guard = self.environment_lock.lock().await;
        let mut environment = self.store.get_environment(environment_id).await?;

        let installation = Installation::new(environment_id, product_version)?;
        self.store.add_installation(&installation).await?;

        environment.register_installation(installation.id());
        self.store.save_environment(&environment).await?;

        info!(
            "Created installation {} of version {} on environment {}",
            installation.id(),
            installation.product_version(),
            environment.name
        );
        Ok(installation)
    }

    pub async fn get_installation(&self, id: InstallationId) -> Result<Installation, OrchestratorError> {
        self.store.get_installation(id).await
    }

    pub async fn list_installations(
        &self,
        environment_id: EnvironmentId,
    ) -> Result<Vec<Installation>, OrchestratorError> {
        // surface unknown environments instead of an empty list
        self.store.get_environment(environment_id).await?;
        self.store.list_installations_by_environment(environment_id).await
    }

    /// Installations the driver has to push forward
    pub async fn list_running(&self) -> Result<Vec<Installation>, OrchestratorError> {
        self.store
            .list_installations_by_status(InstallationStatus::Running)
            .await
    }

    pub async fn next_pending_task(
        &self,
        id: InstallationId,
    ) -> Result<Option<InstallationTask>, OrchestratorError> {
        let installation = self.store.get_installation(id).await?;
        Ok(installation.next_pending_task().cloned())
    }

    pub async fn progress(&self, id: InstallationId) -> Result<u8, OrchestratorError> {
        let installation = self.store.get_installation(id).await?;
        Ok(installation.progress_percentage())
    }

    pub async fn append_task(
        &self,
        id: InstallationId,
        task: NewTask,
    ) -> Result<TaskId, OrchestratorError> {
        let (_, task_id) = self
            .mutate(id, move |installation| {
                let task_id = installation.append_task(
                    task.name,
                    task.description,
                    task.script_ref,
                    task.parameters,
                )?;
                Ok((task_id, Vec::new()))
            })
            .await?;
        debug!("Appended task {} to installation {}", task_id, id);
        Ok(task_id)
    }

    pub async fn start(&self, id: InstallationId) -> Result<Installation, OrchestratorError> {
        let (installation, _) = self
            .mutate(id, |installation| Ok(((), installation.start()?)))
            .await?;
        Ok(installation)
    }

    pub async fn start_task(
        &self,
        id: InstallationId,
        task_id: TaskId,
    ) -> Result<Installation, OrchestratorError> {
        let (installation, _) = self
            .mutate(id, |installation| {
                installation.start_task(task_id)?;
                Ok(((), Vec::new()))
            })
            .await?;
        Ok(installation)
    }

    pub async fn report_progress(
        &self,
        id: InstallationId,
        task_id: TaskId,
        percent: u8,
        log_message: Option<&str>,
    ) -> Result<Installation, OrchestratorError> {
        let (installation, _) = self
            .mutate(id, |installation| {
                installation.report_task_progress(task_id, percent, log_message)?;
                Ok(((), Vec::new()))
            })
            .await?;
        Ok(installation)
    }

    pub async fn complete_task(
        &self,
        id: InstallationId,
        task_id: TaskId,
    ) -> Result<Installation, OrchestratorError> {
        let (installation, _) = self
            .mutate(id, |installation| Ok(((), installation.complete_task(task_id)?)))
            .await?;
        Ok(installation)
    }

    pub async fn fail_task(
        &self,
        id: InstallationId,
        task_id: TaskId,
        error_message: &str,
    ) -> Result<Installation, OrchestratorError> {
        let (installation, _) = self
            .mutate(id, |installation| {
                Ok(((), installation.fail_task(task_id, error_message)?))
            })
            .await?;
        Ok(installation)
    }

    pub async fn cancel(&self, id: InstallationId) -> Result<Installation, OrchestratorError> {
        let (installation, _) = self
            .mutate(id, |installation| Ok(((), installation.cancel()?)))
            .await?;
        info!("Cancelled installation {}", id);
        Ok(installation)
    }

    fn lock_for(&self, id: InstallationId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id).or_default().clone()
    }

    async fn mutate<T, F>(
        &self,
        id: InstallationId,
        op: F,
    ) -> Result<(Installation, T), OrchestratorError>
    where
        F: FnOnce(&mut Installation) -> Result<(T, Vec<InstallationEvent>), OrchestratorError>,
    {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut installation = match self.store.get_installation(id).await {
            Ok(installation) => installation,
            Err(e) => {
                if matches!(e, OrchestratorError::EntityNotFound(_)) {
                    self.release_lock(id);
                }
                return Err(e);
            }
        };
        let loaded_version = installation.version();

        let (value, events) = match op(&mut installation) {
            Ok(applied) => applied,
            Err(e) => {
                if installation.is_terminal() {
                    self.release_lock(id);
                }
                return Err(e);
            }
        };
        self.store
            .update_installation(&installation, loaded_version)
            .await?;

        // terminal installations accept no further mutations
        if installation.is_terminal() {
            self.release_lock(id);
        }
        for event in &events {
            self.notifier.notify(event);
        }
        Ok((installation, value))
    }

    fn release_lock(&self, id: InstallationId) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(&id);
    }
}
