//! Wire models for the rollout control API.

pub mod models;
