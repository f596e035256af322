//! Typed identifiers
//!
//! Every entity gets its own wrapper around a UUID so an installation id can
//! never be passed where a task id is expected. Conversions are explicit.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::OrchestratorError;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = OrchestratorError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|e| {
                    OrchestratorError::InvalidArgument(format!("Invalid {} id '{}': {}", $label, s, e))
                })
            }
        }
    };
}

entity_id!(
    /// Installation identifier
    InstallationId,
    "installation"
);

entity_id!(
    /// Task identifier, unique across installations
    TaskId,
    "task"
);

entity_id!(
    /// Environment identifier
    EnvironmentId,
    "environment"
);

entity_id!(
    /// Tenant identifier
    TenantId,
    "tenant"
);
