//! Users-related HTTP API.
pub mod delete;
pub mod get;
pub mod update;
