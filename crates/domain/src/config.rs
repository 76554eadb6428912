//! Configuration management

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_DB_PATH, DEFAULT_POOL_SIZE, DEFAULT_SWEEP_CRON,
    DEFAULT_SWEEP_JOB_TIMEOUT_SECS, STALE_AFTER_MINUTES,
};
use crate::impl_domain_status_conversions;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage dialect used to build interval arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Sqlite,
    Postgres,
    Mysql,
}

impl_domain_status_conversions!(SqlDialect {
    Sqlite => "sqlite",
    Postgres => "postgres",
    Mysql => "mysql",
});

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
    #[serde(default, skip_serializing)]
    pub encryption_key: Option<String>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub dialect: SqlDialect,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            encryption_key: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            dialect: SqlDialect::Sqlite,
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Stale-timer sweep configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,
    /// Six-field cron expression (seconds first).
    pub cron_expression: String,
    pub stale_after_minutes: i64,
    pub job_timeout_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron_expression: DEFAULT_SWEEP_CRON.to_string(),
            stale_after_minutes: STALE_AFTER_MINUTES,
            job_timeout_secs: DEFAULT_SWEEP_JOB_TIMEOUT_SECS,
        }
    }
}

/// Reference point used when clamping a stopped timer to the weekly limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeeklyLimitPolicy {
    /// Remaining weekly time is measured from the previous log's stop.
    #[default]
    PreviousStop,
    /// Remaining weekly time is measured from the current log's start.
    CurrentStart,
}

impl_domain_status_conversions!(WeeklyLimitPolicy {
    PreviousStop => "previous_stop",
    CurrentStart => "current_start",
});

/// Time tracking behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Organisation default, overridden per employee.
    pub allow_future_dates: bool,
    /// Split a stopped timer that crosses local midnight into two logs.
    pub split_at_midnight: bool,
    pub weekly_limit_policy: WeeklyLimitPolicy,
    /// IANA zone used when the employee has none.
    pub default_timezone: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            allow_future_dates: false,
            split_at_midnight: false,
            weekly_limit_policy: WeeklyLimitPolicy::PreviousStop,
            default_timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
}
