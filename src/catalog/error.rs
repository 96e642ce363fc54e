//! Error types for catalog persistence.

use std::fmt;

use thiserror::Error;

/// Structured classification of database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure that ignore-on-conflict did not absorb (foreign key, not-null).
    ConstraintViolation,
    /// Connection pool timed out waiting for a free connection.
    PoolTimeout,
    /// Connection pool is closed.
    PoolClosed,
    /// Filesystem or transport IO failure.
    Io,
    /// Unclassified database failure.
    Other,
}

impl DbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Database(database_error) => {
                classify_database_error(database_error.as_ref())
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::Io => "io",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

fn classify_database_error(
    database_error: &(dyn sqlx::error::DatabaseError + 'static),
) -> DbErrorKind {
    let code = database_error.code();
    if matches!(
        code.as_deref(),
        Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
    ) {
        return DbErrorKind::BusyOrLocked;
    }

    if database_error.is_unique_violation()
        || database_error.is_foreign_key_violation()
        || database_error.is_check_violation()
        || code
            .as_deref()
            .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT"))
    {
        return DbErrorKind::ConstraintViolation;
    }

    if database_error
        .message()
        .to_ascii_lowercase()
        .contains("database is locked")
    {
        return DbErrorKind::BusyOrLocked;
    }

    DbErrorKind::Other
}

/// Errors that can occur during catalog operations.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification of the failure.
        kind: DbErrorKind,
        /// Human-readable database error text.
        message: String,
    },
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: DbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl CatalogError {
    /// Returns the typed database error kind.
    #[must_use]
    pub fn database_kind(&self) -> DbErrorKind {
        match self {
            Self::Database { kind, .. } => *kind,
        }
    }

    /// True when the write may succeed if repeated once the lock clears.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.database_kind() == DbErrorKind::BusyOrLocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_database_message() {
        let err = CatalogError::Database {
            kind: DbErrorKind::BusyOrLocked,
            message: "database is locked".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("busy_or_locked"));
        assert!(msg.contains("database is locked"));
        assert_eq!(err.database_kind(), DbErrorKind::BusyOrLocked);
        assert!(err.is_busy());
    }

    #[test]
    fn test_pool_closed_classification() {
        let err = CatalogError::from(sqlx::Error::PoolClosed);
        assert_eq!(err.database_kind(), DbErrorKind::PoolClosed);
        assert!(!err.is_busy());
    }
}
