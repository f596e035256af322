//! Application configuration options

use std::time::Duration;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::{GatewayKind, Settings, StorageKind};
use crate::utils::CooldownOptions;
use crate::workers::driver;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Execution gateway configuration
    pub gateway: GatewayOptions,

    /// Enable the control API
    pub enable_server: bool,

    /// Enable the driver worker
    pub enable_driver: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Driver worker options
    pub driver: driver::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions::default(),
            gateway: GatewayOptions::default(),
            enable_server: true,
            enable_driver: true,
            server: ServerOptions::default(),
            driver: driver::Options::default(),
        }
    }
}

impl AppOptions {
    /// Derive the runtime options from a settings document
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
            },
            storage: StorageOptions {
                layout,
                kind: settings.storage.kind,
            },
            gateway: GatewayOptions {
                kind: settings.gateway.kind,
                base_url: settings.gateway.base_url.clone(),
                request_timeout: Duration::from_secs(settings.gateway.request_timeout_secs),
                shell: settings.gateway.shell.clone(),
            },
            enable_server: settings.server.enabled,
            enable_driver: settings.driver.enabled,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            driver: driver::Options {
                interval: Duration::from_millis(settings.driver.interval_ms),
                task_timeout: Duration::from_secs(settings.driver.task_timeout_secs),
                max_gateway_attempts: settings.driver.max_gateway_attempts,
                cooldown: CooldownOptions {
                    base_delay: Duration::from_millis(settings.driver.retry_base_delay_ms),
                    max_delay: Duration::from_millis(settings.driver.retry_max_delay_ms),
                    ..Default::default()
                },
            },
        }
    }
}

/// Lifecycle options for the orchestrator
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Backing store
    pub kind: StorageKind,
}

/// Execution gateway options
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub kind: GatewayKind,

    /// Remote agent base URL
    pub base_url: String,

    /// Remote agent request timeout
    pub request_timeout: Duration,

    /// Shell for locally executed scripts
    pub shell: String,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            kind: GatewayKind::Http,
            base_url: "http://localhost:9090/api/v1".to_string(),
            request_timeout: Duration::from_secs(30),
            shell: "bash".to_string(),
        }
    }
}

/// Control API server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
