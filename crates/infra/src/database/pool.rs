//! r2d2 connection pool for SQLite/SQLCipher
//!
//! Every pooled connection applies the SQLCipher key (when one is
//! configured) followed by the connection pragmas before it is handed out.

use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{debug, info, warn};
use worktrack_domain::{DatabaseConfig, Result};

use crate::errors::conversions::map_pool_error;

pub type SqlitePool = Pool<SqliteConnectionManager>;
pub type SqliteConnection = PooledConnection<SqliteConnectionManager>;

/// Pool settings derived from [`DatabaseConfig`].
#[derive(Clone)]
pub struct PoolConfig {
    pub max_size: u32,
    pub connection_timeout: Duration,
    pub busy_timeout: Duration,
    pub enable_wal: bool,
    pub encryption_key: Option<String>,
}

// The key never reaches the logs.
impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("max_size", &self.max_size)
            .field("connection_timeout", &self.connection_timeout)
            .field("busy_timeout", &self.busy_timeout)
            .field("enable_wal", &self.enable_wal)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from(&DatabaseConfig::default())
    }
}

impl From<&DatabaseConfig> for PoolConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_size: config.pool_size.max(1),
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            enable_wal: true,
            encryption_key: config.encryption_key.clone().filter(|key| !key.is_empty()),
        }
    }
}

/// Build a pool for the database file at `path`.
///
/// One connection is opened eagerly so a wrong key or an unreadable file
/// fails here instead of on the first command.
pub fn create_pool(path: &Path, config: &PoolConfig) -> Result<SqlitePool> {
    let init_config = config.clone();
    let manager = SqliteConnectionManager::file(path)
        .with_init(move |conn| configure_connection(conn, &init_config));

    let pool = Pool::builder()
        .max_size(config.max_size)
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .map_err(|err| {
            warn!(error = %err, db_path = %path.display(), "failed to create connection pool");
            map_pool_error(err)
        })?;

    info!(
        db_path = %path.display(),
        max_connections = config.max_size,
        encrypted = config.encryption_key.is_some(),
        "sqlite pool initialised"
    );
    Ok(pool)
}

fn configure_connection(conn: &mut Connection, config: &PoolConfig) -> rusqlite::Result<()> {
    if let Some(key) = &config.encryption_key {
        conn.pragma_update(None, "key", key)?;
        // Fails with "file is not a database" when the key is wrong.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;
    }

    let mut pragmas = String::new();
    if config.enable_wal {
        pragmas.push_str("PRAGMA journal_mode=WAL;\n");
        pragmas.push_str("PRAGMA wal_autocheckpoint=1000;\n");
    }
    pragmas.push_str("PRAGMA synchronous=NORMAL;\n");
    pragmas.push_str("PRAGMA foreign_keys=ON;\n");
    conn.execute_batch(&pragmas)?;
    conn.busy_timeout(config.busy_timeout)?;

    debug!("sqlite connection configured");
    Ok(())
}
