//! # WorkTrack Domain
//!
//! Business domain types for the time tracking interval engine.
//!
//! This crate contains:
//! - Time logs, time slots, timesheets and their child records
//! - Half-open ranges and the 10-minute bucket grid
//! - Domain error types and Result definitions
//! - Configuration structures and constants
//!
//! ## Architecture
//! - No dependencies on other WorkTrack crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
