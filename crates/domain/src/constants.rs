//! Engine constants
//!
//! Centralized location for the timing constants shared by the interval
//! engine, the sweep and the adapters.

/// Width of one aggregation bucket.
pub const SLOT_MINUTES: i64 = 10;
pub const SLOT_SECONDS: i64 = SLOT_MINUTES * 60;

/// Upper bound for `duration`, `keyboard`, `mouse` and `overall` on a slot.
pub const MAX_SLOT_ACTIVITY: i64 = SLOT_SECONDS;

/// A running log with no activity for this long is considered abandoned.
pub const STALE_AFTER_MINUTES: i64 = 10;

/// Duration given to an abandoned log that never produced a slot.
pub const ABANDONED_LOG_SECONDS: i64 = 10;

// Scheduler defaults
pub const DEFAULT_SWEEP_CRON: &str = "0 * * * * *";
pub const DEFAULT_SWEEP_JOB_TIMEOUT_SECS: u64 = 120;

// Storage defaults
pub const DEFAULT_DB_PATH: &str = "worktrack.db";
pub const DEFAULT_POOL_SIZE: u32 = 8;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub const SECONDS_PER_HOUR: i64 = 3_600;
