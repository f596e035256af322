//! Application services

pub mod installation;

pub use installation::{InstallationService, NewEnvironment, NewTask};
