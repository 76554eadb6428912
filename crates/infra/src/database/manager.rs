//! Database connection manager backed by the r2d2 pool.

use std::path::{Path, PathBuf};

use rusqlite::params;
use tracing::info;
use worktrack_domain::{DatabaseConfig, Result};

use super::pool::{create_pool, PoolConfig, SqliteConnection, SqlitePool};
use crate::errors::conversions::{map_pool_error, map_sql_error};

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Database manager that owns the connection pool.
pub struct DbManager {
    pool: SqlitePool,
    path: PathBuf,
}

impl DbManager {
    /// Create a new manager with the given pool size and optional SQLCipher
    /// key.
    pub fn new<P: AsRef<Path>>(
        db_path: P,
        pool_size: u32,
        encryption_key: Option<&str>,
    ) -> Result<Self> {
        let config = PoolConfig {
            max_size: pool_size.max(1),
            encryption_key: encryption_key.filter(|key| !key.is_empty()).map(str::to_owned),
            ..PoolConfig::default()
        };
        Self::with_pool_config(db_path, &config)
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::with_pool_config(&config.path, &PoolConfig::from(config))
    }

    pub fn with_pool_config<P: AsRef<Path>>(db_path: P, config: &PoolConfig) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let pool = create_pool(&path, config)?;
        Ok(Self { pool, path })
    }

    /// Borrow the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Acquire a connection from the pool.
    pub fn get_connection(&self) -> Result<SqliteConnection> {
        self.pool.get().map_err(map_pool_error)
    }

    /// Ensure the full schema exists on the current database.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(SCHEMA_SQL).map_err(map_sql_error)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, CAST(strftime('%s','now') AS INTEGER))",
            params![SCHEMA_VERSION],
        )
        .map_err(map_sql_error)?;
        info!(db_path = %self.path.display(), version = SCHEMA_VERSION, "schema up to date");
        Ok(())
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify the database answers a trivial query.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0)).map_err(map_sql_error)?;
        Ok(())
    }
}
