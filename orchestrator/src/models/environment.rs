//! Environment model

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;
use crate::models::ids::{EnvironmentId, InstallationId, TenantId};

/// Target an installation runs against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    /// Unique environment ID
    pub id: EnvironmentId,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Display name
    pub name: String,

    /// Host the scripts are executed against
    pub server_host: String,

    /// Optional connection string handed to the scripts
    #[serde(default)]
    pub connection_string: Option<String>,

    /// Free-form settings exported to the scripts
    #[serde(default)]
    pub config: BTreeMap<String, String>,

    /// Installations created for this environment, for listing only
    #[serde(default)]
    pub installation_ids: Vec<InstallationId>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl Environment {
    /// Create a new environment
    pub fn new(
        tenant_id: TenantId,
        name: impl Into<String>,
        server_host: impl Into<String>,
    ) -> Result<Self, OrchestratorError> {
        let name = name.into();
        let server_host = server_host.into();
        if name.trim().is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "Environment name must not be empty".to_string(),
            ));
        }
        if server_host.trim().is_empty() {
            return Err(OrchestratorError::InvalidArgument(format!(
                "Environment '{}' needs a server host",
                name
            )));
        }

        Ok(Self {
            id: EnvironmentId::new(),
            tenant_id,
            name,
            server_host,
            connection_string: None,
            config: BTreeMap::new(),
            installation_ids: Vec::new(),
            created_at: Utc::now(),
        })
    }

    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    pub fn with_config(mut self, config: BTreeMap<String, String>) -> Self {
        self.config = config;
        self
    }

    /// Remember an installation for listing; registering twice is a no-op
    pub fn register_installation(&mut self, installation_id: InstallationId) {
        if !self.installation_ids.contains(&installation_id) {
            self.installation_ids.push(installation_id);
        }
    }
}
