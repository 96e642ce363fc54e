//! SQLite connection and schema management for the catalog store.
//!
//! Every pooled connection is opened with the same options: WAL journal,
//! busy timeout and foreign keys. The schema comes from the embedded
//! migrations in `migrations/`.
//!
//! # Example
//!
//! ```no_run
//! use ebook_dl_core::Database;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("ebook-dl.db")).await?;
//! db.close().await;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite serializes writers, so a handful of connections is enough for
/// the pipeline's one-batch-per-stage writes.
const MAX_CONNECTIONS: u32 = 5;

/// How long a connection waits on a locked database before SQLITE_BUSY.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database-related errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connection(#[from] sqlx::Error),

    /// Failed to run migrations.
    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connection pool over the catalog database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the catalog database at `db_path` and
    /// runs pending migrations.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    /// Creates an in-memory database, mostly for tests.
    ///
    /// One connection that is never recycled, so every query sees the same
    /// memory database for the pool's lifetime.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, DbError> {
        MIGRATOR.run(&pool).await?;
        debug!("catalog schema up to date");
        Ok(Self { pool })
    }

    /// Returns a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Waits for in-flight queries and closes every connection, checkpointing
    /// the WAL into the main database file.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_new_in_memory_succeeds() {
        let db = Database::new_in_memory().await;
        assert!(db.is_ok(), "Failed to create in-memory database");
    }

    #[tokio::test]
    async fn test_database_catalog_tables_exist() {
        let db = Database::new_in_memory().await.unwrap();

        sqlx::query("INSERT INTO profile (url) VALUES ('/book/a/1')")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO book_info (title) VALUES ('A')")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO book_url (book_id, tn_url) VALUES (1, 'tok')")
            .execute(db.pool())
            .await
            .unwrap();

        let (resource_url,): (String,) =
            sqlx::query_as("SELECT resource_url FROM book_url WHERE tn_url = 'tok'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(resource_url, "", "resource_url should default to empty");
    }

    #[tokio::test]
    async fn test_database_profile_url_is_unique() {
        let db = Database::new_in_memory().await.unwrap();

        sqlx::query("INSERT INTO profile (url) VALUES ('/book/a/1')")
            .execute(db.pool())
            .await
            .unwrap();
        let result = sqlx::query("INSERT INTO profile (url) VALUES ('/book/a/1')")
            .execute(db.pool())
            .await;

        assert!(result.is_err(), "plain insert of a duplicate url must fail");
    }

    #[tokio::test]
    async fn test_download_row_requires_existing_book() {
        let db = Database::new_in_memory().await.unwrap();
        let result = sqlx::query("INSERT INTO book_url (book_id, tn_url) VALUES (42, 'tok')")
            .execute(db.pool())
            .await;
        assert!(result.is_err(), "foreign keys must be enforced");
    }

    #[tokio::test]
    async fn test_file_database_uses_wal_and_reopens() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("catalog.db");

        let db = Database::new(&db_path).await.unwrap();
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        sqlx::query("INSERT INTO profile (url) VALUES ('/book/a/1')")
            .execute(db.pool())
            .await
            .unwrap();
        db.close().await;

        let reopened = Database::new(&db_path).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profile")
            .fetch_one(reopened.pool())
            .await
            .unwrap();
        assert_eq!(count, 1, "migrations must not reset existing data");
    }
}
