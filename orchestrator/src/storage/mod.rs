//! Storage: layout, settings and installation stores

pub mod json;
pub mod layout;
pub mod memory;
pub mod repository;
pub mod settings;

pub use json::JsonStore;
pub use memory::MemoryStore;
pub use repository::{EnvironmentRepository, InstallationRepository, Store};
