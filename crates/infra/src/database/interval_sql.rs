//! Per-dialect interval arithmetic
//!
//! The tracking store never spells out date arithmetic itself. Range
//! predicates and duration sums come from an [`IntervalSql`] so another
//! backend only needs a new implementation here.

use std::fmt::Debug;
use std::sync::Arc;

use worktrack_domain::SqlDialect;

/// SQL fragments for half-open interval queries over `started_at`/`stopped_at`.
///
/// Fragments that take placeholders expect them in the order they are
/// bound, so positional dialects stay correct.
pub trait IntervalSql: Debug + Send + Sync {
    fn dialect(&self) -> SqlDialect;

    /// Bind marker for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    /// Non-negative length of a stopped log in seconds.
    fn log_duration_expr(&self) -> String;

    /// `[started_at, stopped_at)` strictly overlaps `[start, end)`.
    fn overlap_predicate(&self, start: &str, end: &str) -> String {
        format!("stopped_at > {start} AND started_at < {end}")
    }

    /// `started_at` falls in `[start, end)`.
    fn starts_within_predicate(&self, start: &str, end: &str) -> String {
        format!("started_at >= {start} AND started_at < {end}")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteIntervalSql;

impl IntervalSql for SqliteIntervalSql {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{index}")
    }

    fn log_duration_expr(&self) -> String {
        "MAX(0, stopped_at - started_at)".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresIntervalSql;

impl IntervalSql for PostgresIntervalSql {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn log_duration_expr(&self) -> String {
        "GREATEST(0, EXTRACT(EPOCH FROM (stopped_at - started_at)))::BIGINT".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlIntervalSql;

impl IntervalSql for MysqlIntervalSql {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Mysql
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn log_duration_expr(&self) -> String {
        "GREATEST(0, TIMESTAMPDIFF(SECOND, started_at, stopped_at))".to_string()
    }
}

pub fn interval_sql_for(dialect: SqlDialect) -> Arc<dyn IntervalSql> {
    match dialect {
        SqlDialect::Sqlite => Arc::new(SqliteIntervalSql),
        SqlDialect::Postgres => Arc::new(PostgresIntervalSql),
        SqlDialect::Mysql => Arc::new(MysqlIntervalSql),
    }
}
