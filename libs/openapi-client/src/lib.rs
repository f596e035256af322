//! Wire models for the remote execution agent API.

pub mod models;
