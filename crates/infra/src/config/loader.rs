//! Configuration loader
//!
//! Loads engine configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If the required ones are missing, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `WORKTRACK_DB_PATH`: Database file path (required)
//! - `WORKTRACK_DB_POOL_SIZE`: Connection pool size (required)
//! - `WORKTRACK_DB_ENCRYPTION_KEY`: SQLCipher key
//! - `WORKTRACK_DB_DIALECT`: `sqlite`, `postgres` or `mysql`
//! - `WORKTRACK_SWEEP_ENABLED`: Whether the stale-timer sweep runs
//! - `WORKTRACK_SWEEP_CRON`: Six-field cron expression for the sweep
//! - `WORKTRACK_STALE_AFTER_MINUTES`: Silence before a timer is abandoned
//! - `WORKTRACK_ALLOW_FUTURE_DATES`: Organisation default for future entries
//! - `WORKTRACK_SPLIT_AT_MIDNIGHT`: Cut stopped timers at local midnight
//! - `WORKTRACK_DEFAULT_TIMEZONE`: IANA zone used when an employee has none
//! - `WORKTRACK_WEEKLY_LIMIT_POLICY`: `previous_stop` or `current_start`
//! - `WORKTRACK_LOG_JSON`: Emit JSON log lines
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.{json,toml}` and `./worktrack.{json,toml}`
//! 2. The same names one and two directories up
//! 3. The same names relative to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use worktrack_domain::{
    Config, DatabaseConfig, LoggingConfig, Result, SqlDialect, SweepConfig, TrackingConfig,
    WeeklyLimitPolicy, WorkTrackError,
};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["config.json", "config.toml", "worktrack.json", "worktrack.toml"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `WorkTrackError::Config` if neither source yields a valid
/// configuration.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// `WORKTRACK_DB_PATH` and `WORKTRACK_DB_POOL_SIZE` are required; every
/// other setting falls back to its default.
///
/// # Errors
/// Returns `WorkTrackError::Config` if required variables are missing
/// or any variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let path = env_var("WORKTRACK_DB_PATH")?;
    let pool_size = env_parse::<u32>("WORKTRACK_DB_POOL_SIZE", "pool size")?;
    let encryption_key = std::env::var("WORKTRACK_DB_ENCRYPTION_KEY").ok();
    let dialect = match std::env::var("WORKTRACK_DB_DIALECT") {
        Ok(value) => SqlDialect::from_str(&value).map_err(WorkTrackError::Config)?,
        Err(_) => SqlDialect::default(),
    };

    let sweep_defaults = SweepConfig::default();
    let sweep = SweepConfig {
        enabled: env_bool("WORKTRACK_SWEEP_ENABLED", sweep_defaults.enabled),
        cron_expression: std::env::var("WORKTRACK_SWEEP_CRON")
            .unwrap_or(sweep_defaults.cron_expression),
        stale_after_minutes: env_parse_or(
            "WORKTRACK_STALE_AFTER_MINUTES",
            "stale threshold",
            sweep_defaults.stale_after_minutes,
        )?,
        job_timeout_secs: sweep_defaults.job_timeout_secs,
    };

    let tracking_defaults = TrackingConfig::default();
    let weekly_limit_policy = match std::env::var("WORKTRACK_WEEKLY_LIMIT_POLICY") {
        Ok(value) => WeeklyLimitPolicy::from_str(&value).map_err(WorkTrackError::Config)?,
        Err(_) => tracking_defaults.weekly_limit_policy,
    };
    let tracking = TrackingConfig {
        allow_future_dates: env_bool(
            "WORKTRACK_ALLOW_FUTURE_DATES",
            tracking_defaults.allow_future_dates,
        ),
        split_at_midnight: env_bool(
            "WORKTRACK_SPLIT_AT_MIDNIGHT",
            tracking_defaults.split_at_midnight,
        ),
        weekly_limit_policy,
        default_timezone: std::env::var("WORKTRACK_DEFAULT_TIMEZONE")
            .unwrap_or(tracking_defaults.default_timezone),
    };

    Ok(Config {
        database: DatabaseConfig {
            path,
            pool_size,
            encryption_key,
            dialect,
            ..DatabaseConfig::default()
        },
        sweep,
        tracking,
        logging: LoggingConfig { json: env_bool("WORKTRACK_LOG_JSON", false) },
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations via
/// [`probe_config_paths`]. The format follows the file extension.
///
/// # Errors
/// Returns `WorkTrackError::Config` if the file is missing, unreadable or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(WorkTrackError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            WorkTrackError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| WorkTrackError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| WorkTrackError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| WorkTrackError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(WorkTrackError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file in the working directory, its parents, or
/// next to the executable.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.extend([exe_dir.to_path_buf(), exe_dir.join(".."), exe_dir.join("../..")]);
        }
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        WorkTrackError::Config(format!("Missing required environment variable: {key}"))
    })
}

fn env_parse<T>(key: &str, what: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(key)?
        .trim()
        .parse::<T>()
        .map_err(|e| WorkTrackError::Config(format!("Invalid {what}: {e}")))
}

fn env_parse_or<T>(key: &str, what: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(_) => env_parse(key, what),
        Err(_) => Ok(default),
    }
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
