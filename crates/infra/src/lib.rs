//! # WorkTrack Infrastructure
//!
//! Infrastructure implementations of core engine ports.
//!
//! This crate contains:
//! - The SQLite tracking store, connection pool and schema migrations
//! - Per-dialect interval arithmetic
//! - Configuration loading from the environment and config files
//! - The cron-driven sweep scheduler
//!
//! ## Architecture
//! - Implements traits defined in `worktrack-core`
//! - Depends on `worktrack-domain` and `worktrack-core`
//! - Contains all "impure" code (I/O, scheduling)

pub mod config;
pub mod database;
pub mod errors;
pub mod scheduling;

// Re-export commonly used items
pub use database::*;
pub use errors::InfraError;
pub use scheduling::*;
