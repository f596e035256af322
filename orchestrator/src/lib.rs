//! Rollout Library
//!
//! Core modules for the rollout installation orchestrator.

pub mod app;
pub mod errors;
pub mod filesys;
pub mod gateway;
pub mod logs;
pub mod models;
pub mod notify;
pub mod server;
pub mod services;
pub mod storage;
pub mod utils;
pub mod workers;
