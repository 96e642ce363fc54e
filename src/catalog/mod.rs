//! Idempotent persistence of crawl results.
//!
//! Three collections, each with a natural unique key:
//! - profile page paths (unique by path)
//! - book records (unique by title)
//! - book downloads (unique by token, owned by a book record)
//!
//! Every insert is ignore-on-conflict, so re-running any stage over the same
//! input leaves the store unchanged. The only update is filling a download's
//! resource URL, which happens at most once per row.
//!
//! Writes are batched into one transaction per call and issued by the pipeline
//! after a worker pool finishes, never from inside workers.
//!
//! # Example
//!
//! ```ignore
//! use ebook_dl_core::{Catalog, Database};
//!
//! let catalog = Catalog::new(Database::new_in_memory().await?);
//! catalog.store_profile_urls(&["/book/a/1".to_string()]).await?;
//! assert_eq!(catalog.profile_urls().await?, vec!["/book/a/1"]);
//! ```

mod error;
mod model;
mod repository;

pub use error::{CatalogError, DbErrorKind};
pub use model::{BookDownload, BookRecord, CatalogCounts, DownloadFilter, StoredBooks};
pub use repository::CatalogRepository;

use std::future::Future;
use std::time::Duration;

use sqlx::Row;
use tracing::{debug, instrument, warn};

use crate::db::Database;

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Attempts for one batch write while the database reports busy or locked.
const BUSY_WRITE_ATTEMPTS: u32 = 3;

const BUSY_WRITE_DELAY: Duration = Duration::from_millis(100);

/// Re-runs a whole batch transaction when it fails with
/// [`DbErrorKind::BusyOrLocked`]. The failed transaction is rolled back on
/// drop, so every attempt starts from the same state.
async fn retry_when_busy<T, F, Fut>(mut write: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match write().await {
            Err(error) if error.is_busy() && attempt < BUSY_WRITE_ATTEMPTS => {
                warn!(attempt, error = %error, "catalog busy; retrying batch write");
                attempt += 1;
                tokio::time::sleep(BUSY_WRITE_DELAY).await;
            }
            result => return result,
        }
    }
}

/// SQLite-backed catalog store.
#[derive(Debug, Clone)]
pub struct Catalog {
    db: Database,
}

impl Catalog {
    /// Creates a catalog over an opened database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Stores discovered profile page paths, ignoring ones already present.
    ///
    /// Returns the number of newly inserted paths.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the transaction fails.
    #[instrument(skip(self, urls), fields(count = urls.len()))]
    pub async fn store_profile_urls(&self, urls: &[String]) -> Result<u64> {
        if urls.is_empty() {
            return Ok(0);
        }
        retry_when_busy(move || self.write_profile_urls(urls)).await
    }

    async fn write_profile_urls(&self, urls: &[String]) -> Result<u64> {
        let mut tx = self.db.pool().begin().await?;
        let mut inserted = 0;
        for url in urls {
            inserted += sqlx::query("INSERT OR IGNORE INTO profile (url) VALUES (?)")
                .bind(url)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        debug!(inserted, "stored profile urls");
        Ok(inserted)
    }

    /// Returns every stored profile page path in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn profile_urls(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT url FROM profile ORDER BY id")
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows.iter().map(|row| row.get("url")).collect())
    }

    /// Stores book records and one download row per token.
    ///
    /// A title that already exists keeps its first row; tokens of the
    /// incoming record are still attached to it unless already stored.
    /// Records with an empty title are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the transaction fails.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn store_book_records(&self, records: &[BookRecord]) -> Result<StoredBooks> {
        let titled: Vec<&BookRecord> = records.iter().filter(|r| !r.title.is_empty()).collect();
        if titled.is_empty() {
            return Ok(StoredBooks::default());
        }
        retry_when_busy(|| self.write_book_records(&titled)).await
    }

    async fn write_book_records(&self, records: &[&BookRecord]) -> Result<StoredBooks> {
        let mut stored = StoredBooks::default();
        let mut tx = self.db.pool().begin().await?;
        for record in records {
            stored.books += sqlx::query(
                r"INSERT OR IGNORE INTO book_info (title, details, description, preview_image)
                  VALUES (?, ?, ?, ?)",
            )
            .bind(&record.title)
            .bind(&record.details)
            .bind(&record.description)
            .bind(record.preview_image.as_deref())
            .execute(&mut *tx)
            .await?
            .rows_affected();

            let book_id: i64 = sqlx::query("SELECT id FROM book_info WHERE title = ?")
                .bind(&record.title)
                .fetch_one(&mut *tx)
                .await?
                .get("id");

            for token in &record.tokens {
                stored.downloads +=
                    sqlx::query("INSERT OR IGNORE INTO book_url (book_id, tn_url) VALUES (?, ?)")
                        .bind(book_id)
                        .bind(token)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
            }
        }
        tx.commit().await?;

        debug!(books = stored.books, downloads = stored.downloads, "stored book records");
        Ok(stored)
    }

    /// Looks up a stored book record (with its tokens) by title.
    #[cfg(test)]
    async fn book(&self, title: &str) -> Result<Option<BookRecord>> {
        let Some(row) = sqlx::query(
            "SELECT id, title, details, description, preview_image FROM book_info WHERE title = ?",
        )
        .bind(title)
        .fetch_optional(self.db.pool())
        .await?
        else {
            return Ok(None);
        };

        let book_id: i64 = row.get("id");
        let tokens = sqlx::query("SELECT tn_url FROM book_url WHERE book_id = ? ORDER BY id")
            .bind(book_id)
            .fetch_all(self.db.pool())
            .await?
            .iter()
            .map(|token_row| token_row.get("tn_url"))
            .collect();

        Ok(Some(BookRecord {
            title: row.get("title"),
            details: row.get("details"),
            description: row.get("description"),
            preview_image: row.get("preview_image"),
            tokens,
        }))
    }

    /// Returns download rows matching `filter`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn book_downloads(&self, filter: DownloadFilter) -> Result<Vec<BookDownload>> {
        let sql = match filter {
            DownloadFilter::Unresolved => {
                "SELECT id, book_id, tn_url, resource_url FROM book_url WHERE resource_url = '' ORDER BY id"
            }
            DownloadFilter::Resolved => {
                "SELECT id, book_id, tn_url, resource_url FROM book_url WHERE resource_url <> '' ORDER BY id"
            }
        };
        let rows = sqlx::query_as::<_, BookDownload>(sql)
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows)
    }

    /// Records resolved resource URLs.
    ///
    /// Rows with an empty `resource_url` are skipped, and rows already resolved
    /// in the store are left untouched, so a URL never changes once set.
    /// Returns the number of rows updated.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the transaction fails.
    #[instrument(skip(self, downloads), fields(count = downloads.len()))]
    pub async fn store_resource_urls(&self, downloads: &[BookDownload]) -> Result<u64> {
        let resolved: Vec<&BookDownload> = downloads.iter().filter(|d| d.is_resolved()).collect();
        if resolved.is_empty() {
            return Ok(0);
        }
        retry_when_busy(|| self.write_resource_urls(&resolved)).await
    }

    async fn write_resource_urls(&self, downloads: &[&BookDownload]) -> Result<u64> {
        let mut tx = self.db.pool().begin().await?;
        let mut updated = 0;
        for download in downloads {
            updated += sqlx::query(
                "UPDATE book_url SET resource_url = ? WHERE id = ? AND resource_url = ''",
            )
            .bind(&download.resource_url)
            .bind(download.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;

        debug!(updated, "stored resource urls");
        Ok(updated)
    }

    /// Returns row counts for each collection.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn counts(&self) -> Result<CatalogCounts> {
        let row = sqlx::query(
            r"SELECT
                (SELECT COUNT(*) FROM profile) AS profiles,
                (SELECT COUNT(*) FROM book_info) AS books,
                (SELECT COUNT(*) FROM book_url) AS downloads,
                (SELECT COUNT(*) FROM book_url WHERE resource_url <> '') AS resolved",
        )
        .fetch_one(self.db.pool())
        .await?;

        Ok(CatalogCounts {
            profiles: row.get("profiles"),
            books: row.get("books"),
            downloads: row.get("downloads"),
            resolved: row.get("resolved"),
        })
    }
}
