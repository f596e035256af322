//! Server state

use std::sync::Arc;

use crate::services::InstallationService;

/// Server state shared across handlers
pub struct ServerState {
    pub service: Arc<InstallationService>,
}

impl ServerState {
    pub fn new(service: Arc<InstallationService>) -> Self {
        Self { service }
    }
}
