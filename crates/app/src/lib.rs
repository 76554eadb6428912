//! # WorkTrack App
//!
//! Daemon layer - wiring and main entry point.
//!
//! This crate contains:
//! - Application context (dependency injection)
//! - Tracing subscriber setup
//!
//! ## Architecture
//! - Depends on `domain`, `core`, and `infra`
//! - Wires up the hexagonal architecture

pub mod context;
pub mod logging;

pub use context::*;
pub use logging::init_tracing;
