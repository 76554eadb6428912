//! Scheduling infrastructure for the stale-timer sweep
//!
//! The scheduler follows the same runtime rules as every long-lived task in
//! this workspace:
//! - Explicit lifecycle management (start/stop)
//! - Join handles for spawned tasks
//! - Cancellation token support
//! - Timeout wrapping on all async operations

pub mod error;
pub mod sweep_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use sweep_scheduler::{EngineSweepJob, SweepJob, SweepScheduler, SweepSchedulerConfig};
