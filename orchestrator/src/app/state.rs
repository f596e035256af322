//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::{AppOptions, GatewayOptions};
use crate::errors::OrchestratorError;
use crate::gateway::{ExecutionGateway, HttpExecutionGateway, LocalScriptGateway};
use crate::notify::BroadcastNotifier;
use crate::services::InstallationService;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{GatewayKind, StorageKind};
use crate::storage::{JsonStore, MemoryStore, Store};

/// Main application state
pub struct AppState {
    /// Installation and environment persistence
    pub store: Arc<dyn Store>,

    /// Fan-out of installation events
    pub notifier: Arc<BroadcastNotifier>,

    /// Installation service
    pub service: Arc<InstallationService>,

    /// Script executor driven by the driver worker
    pub gateway: Arc<dyn ExecutionGateway>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, OrchestratorError> {
        info!("Initializing application state...");

        let layout = &options.storage.layout;
        let store: Arc<dyn Store> = match options.storage.kind {
            StorageKind::Memory => {
                info!("Using in-memory store, state is lost on exit");
                Arc::new(MemoryStore::new())
            }
            StorageKind::Json => {
                info!("Using JSON store under {:?}", layout.base_dir);
                Arc::new(JsonStore::open(layout).await?)
            }
        };

        let notifier = Arc::new(BroadcastNotifier::default());
        let service = Arc::new(InstallationService::new(store.clone(), notifier.clone()));
        let gateway = init_gateway(&options.gateway, layout).await?;

        Ok(Self {
            store,
            notifier,
            service,
            gateway,
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        info!(
            "Shutting down application state ({} event subscriber(s))...",
            self.notifier.subscriber_count()
        );
        Ok(())
    }
}

async fn init_gateway(
    options: &GatewayOptions,
    layout: &StorageLayout,
) -> Result<Arc<dyn ExecutionGateway>, OrchestratorError> {
    match options.kind {
        GatewayKind::Http => {
            info!("Using remote execution agent at {}", options.base_url);
            let gateway = HttpExecutionGateway::new(&options.base_url, options.request_timeout)?;
            Ok(Arc::new(gateway))
        }
        GatewayKind::Local => {
            let work_dir = layout.work_dir();
            work_dir.create().await?;
            info!(
                "Running scripts locally with {} in {:?}",
                options.shell,
                work_dir.path()
            );
            Ok(Arc::new(LocalScriptGateway::new(
                options.shell.clone(),
                work_dir.path(),
            )))
        }
    }
}
