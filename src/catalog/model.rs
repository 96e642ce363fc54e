//! Catalog row types.

use std::fmt;

use sqlx::FromRow;

/// Metadata scraped from one book detail page.
///
/// `title` is the natural key; a record is only ever stored once per title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookRecord {
    pub title: String,
    /// Free-text details block (publisher, pages, year...).
    pub details: String,
    /// Markdown description; empty when the page layout did not match.
    pub description: String,
    /// Cover image URL, when the page shows one.
    pub preview_image: Option<String>,
    /// Opaque tokens resolvable to download URLs.
    pub tokens: Vec<String>,
}

/// One download token of a stored book.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BookDownload {
    pub id: i64,
    #[sqlx(rename = "book_id")]
    pub owner_book_id: i64,
    #[sqlx(rename = "tn_url")]
    pub token: String,
    /// Empty until resolved; never reset once set.
    pub resource_url: String,
}

impl BookDownload {
    /// Returns true once the resource URL is known.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !self.resource_url.is_empty()
    }
}

impl fmt::Display for BookDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BookDownload {{ id: {}, token: {}, resolved: {} }}",
            self.id,
            self.token,
            self.is_resolved()
        )
    }
}

/// Which download rows to select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFilter {
    /// Rows still waiting for a resource URL (work set of the resolution stage).
    Unresolved,
    /// Rows with a resource URL (work set of the download stage).
    Resolved,
}

/// Row counts per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounts {
    pub profiles: i64,
    pub books: i64,
    pub downloads: i64,
    pub resolved: i64,
}

/// Rows actually inserted by [`Catalog::store_book_records`](super::Catalog::store_book_records).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoredBooks {
    pub books: u64,
    pub downloads: u64,
}
