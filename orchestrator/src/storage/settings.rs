//! Settings file management

use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;
use crate::logs::LogLevel;

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write logs to daily files under the storage logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Persistence configuration
    #[serde(default)]
    pub storage: StorageSettings,

    /// Control API configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Driver loop configuration
    #[serde(default)]
    pub driver: DriverSettings,

    /// Execution gateway configuration
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Maximum delay for graceful shutdown, in seconds
    #[serde(default = "default_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_shutdown_delay() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            storage: StorageSettings::default(),
            server: ServerSettings::default(),
            driver: DriverSettings::default(),
            gateway: GatewaySettings::default(),
            max_shutdown_delay_secs: default_shutdown_delay(),
        }
    }
}

impl Settings {
    /// Reject settings the orchestrator cannot start with
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.gateway.kind == GatewayKind::Http {
            url::Url::parse(&self.gateway.base_url).map_err(|e| {
                OrchestratorError::ConfigError(format!(
                    "Invalid gateway base_url '{}': {}",
                    self.gateway.base_url, e
                ))
            })?;
        }
        if self.driver.interval_ms == 0 {
            return Err(OrchestratorError::ConfigError(
                "driver.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.driver.max_gateway_attempts == 0 {
            return Err(OrchestratorError::ConfigError(
                "driver.max_gateway_attempts must be at least 1".to_string(),
            ));
        }
        if self.driver.retry_base_delay_ms > self.driver.retry_max_delay_ms {
            return Err(OrchestratorError::ConfigError(
                "driver.retry_base_delay_ms exceeds driver.retry_max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where installations are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    #[default]
    Json,
}

/// Persistence settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub kind: StorageKind,

    /// Overrides the default storage base directory
    #[serde(default)]
    pub base_dir: Option<String>,
}

/// Control API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Driver loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay between two passes over the running installations
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// A task running longer than this is cancelled and failed
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,

    /// Gateway calls per task before giving up
    #[serde(default = "default_max_attempts")]
    pub max_gateway_attempts: u32,

    /// First retry delay after a failed gateway call
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Upper bound of the retry delay
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_task_timeout() -> u64 {
    3600
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base_delay() -> u64 {
    1000
}

fn default_retry_max_delay() -> u64 {
    60_000
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_interval_ms(),
            task_timeout_secs: default_task_timeout(),
            max_gateway_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
        }
    }
}

/// Which gateway executes the scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    #[default]
    Http,
    Local,
}

/// Execution gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default)]
    pub kind: GatewayKind,

    /// Base URL of the remote execution agent
    #[serde(default = "default_gateway_url")]
    pub base_url: String,

    /// Request timeout for the remote agent, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shell used by the local gateway
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_gateway_url() -> String {
    "http://localhost:9090/api/v1".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_shell() -> String {
    "bash".to_string()
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            kind: GatewayKind::Http,
            base_url: default_gateway_url(),
            request_timeout_secs: default_request_timeout(),
            shell: default_shell(),
        }
    }
}
