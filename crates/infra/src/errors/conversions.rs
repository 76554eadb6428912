//! Conversions from external infrastructure errors into domain errors.

use rusqlite::Error as SqlError;
use tokio::task::JoinError;
use worktrack_domain::WorkTrackError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub WorkTrackError);

impl From<InfraError> for WorkTrackError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<WorkTrackError> for InfraError {
    fn from(value: WorkTrackError) -> Self {
        InfraError(value)
    }
}

impl std::fmt::Display for InfraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for InfraError {}

trait IntoWorkTrackError {
    fn into_worktrack(self) -> WorkTrackError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → WorkTrackError */
/* -------------------------------------------------------------------------- */

impl IntoWorkTrackError for SqlError {
    fn into_worktrack(self) -> WorkTrackError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        fn looks_like_wrong_key(message: &str) -> bool {
            let lower = message.to_ascii_lowercase();
            lower.contains("not a database") || lower.contains("encrypted")
        }

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        WorkTrackError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        WorkTrackError::Database("database is locked".into())
                    }
                    // SQLITE_CONSTRAINT_UNIQUE
                    (ErrorCode::ConstraintViolation, 2067) => {
                        WorkTrackError::Conflict(format!("unique constraint violation: {message}"))
                    }
                    // SQLITE_CONSTRAINT_FOREIGNKEY
                    (ErrorCode::ConstraintViolation, 787) => {
                        WorkTrackError::Database("foreign key constraint violation".into())
                    }
                    (_, _) if looks_like_wrong_key(&message) => WorkTrackError::Config(
                        "SQLCipher key rejected or database not encrypted".into(),
                    ),
                    _ => WorkTrackError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => WorkTrackError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                WorkTrackError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                WorkTrackError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                WorkTrackError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidParameterName(parameter_name) => {
                WorkTrackError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => WorkTrackError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => WorkTrackError::Database("invalid SQL query".into()),
            other => WorkTrackError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_worktrack())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → WorkTrackError */
/* -------------------------------------------------------------------------- */

impl IntoWorkTrackError for r2d2::Error {
    fn into_worktrack(self) -> WorkTrackError {
        let message = self.to_string();
        let lower = message.to_ascii_lowercase();
        if lower.contains("timed out") {
            WorkTrackError::Database(format!("connection pool timeout: {message}"))
        } else if lower.contains("not a database") || lower.contains("encrypted") {
            WorkTrackError::Config("SQLCipher key rejected or database not encrypted".into())
        } else {
            WorkTrackError::Database(format!("connection pool failure: {message}"))
        }
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(value.into_worktrack())
    }
}

/* -------------------------------------------------------------------------- */
/* tokio::task::JoinError → WorkTrackError */
/* -------------------------------------------------------------------------- */

impl IntoWorkTrackError for JoinError {
    fn into_worktrack(self) -> WorkTrackError {
        if self.is_cancelled() {
            WorkTrackError::Internal("blocking task cancelled".into())
        } else {
            WorkTrackError::Internal(format!("blocking task panicked: {self}"))
        }
    }
}

impl From<JoinError> for InfraError {
    fn from(value: JoinError) -> Self {
        InfraError(value.into_worktrack())
    }
}

/// Map a rusqlite error straight into the domain error.
pub fn map_sql_error(err: SqlError) -> WorkTrackError {
    InfraError::from(err).into()
}

/// Map a pool error straight into the domain error.
pub fn map_pool_error(err: r2d2::Error) -> WorkTrackError {
    InfraError::from(err).into()
}

/// Map a blocking-task failure straight into the domain error.
pub fn map_join_error(err: JoinError) -> WorkTrackError {
    InfraError::from(err).into()
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
