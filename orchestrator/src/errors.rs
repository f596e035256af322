//! Error types for the rollout orchestrator

use thiserror::Error;

/// Main error type for the rollout orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A task transition was attempted from a status that forbids it
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// An installation-level rule was broken (start without tasks, append after start, ...)
    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(String),

    #[error("Not found: {0}")]
    EntityNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The stored aggregate moved on since it was loaded
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Gateway error: {0}")]
    GatewayError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// True for errors raised by a domain guard rather than by infrastructure
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            OrchestratorError::InvalidStateTransition(_)
                | OrchestratorError::BusinessRuleViolation(_)
                | OrchestratorError::EntityNotFound(_)
                | OrchestratorError::InvalidArgument(_)
        )
    }

    /// Stable machine readable code, used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::InvalidStateTransition(_) => "invalid_state_transition",
            OrchestratorError::BusinessRuleViolation(_) => "business_rule_violation",
            OrchestratorError::EntityNotFound(_) => "not_found",
            OrchestratorError::InvalidArgument(_) => "invalid_argument",
            OrchestratorError::ConcurrencyConflict(_) => "concurrency_conflict",
            OrchestratorError::GatewayError(_) | OrchestratorError::HttpError(_) => "gateway_error",
            _ => "internal_error",
        }
    }
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}
