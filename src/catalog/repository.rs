//! Repository seam for catalog persistence.
//!
//! The pipeline depends on this trait rather than on [`Catalog`] directly so
//! orchestration can be exercised against any store honoring the same
//! ignore-on-conflict contract.

use async_trait::async_trait;

use super::{
    BookDownload, BookRecord, Catalog, CatalogCounts, DownloadFilter, Result, StoredBooks,
};

/// Data-access contract for the crawl pipeline.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Stores profile page paths, ignoring duplicates.
    async fn store_profile_urls(&self, urls: &[String]) -> Result<u64>;

    /// Returns every stored profile page path.
    async fn profile_urls(&self) -> Result<Vec<String>>;

    /// Stores book records and their download tokens, ignoring duplicates.
    async fn store_book_records(&self, records: &[BookRecord]) -> Result<StoredBooks>;

    /// Returns download rows matching a resolution filter.
    async fn book_downloads(&self, filter: DownloadFilter) -> Result<Vec<BookDownload>>;

    /// Fills resource URLs on still-unresolved rows.
    async fn store_resource_urls(&self, downloads: &[BookDownload]) -> Result<u64>;

    /// Returns per-collection row counts.
    async fn counts(&self) -> Result<CatalogCounts>;
}

#[async_trait]
impl CatalogRepository for Catalog {
    async fn store_profile_urls(&self, urls: &[String]) -> Result<u64> {
        Catalog::store_profile_urls(self, urls).await
    }

    async fn profile_urls(&self) -> Result<Vec<String>> {
        Catalog::profile_urls(self).await
    }

    async fn store_book_records(&self, records: &[BookRecord]) -> Result<StoredBooks> {
        Catalog::store_book_records(self, records).await
    }

    async fn book_downloads(&self, filter: DownloadFilter) -> Result<Vec<BookDownload>> {
        Catalog::book_downloads(self, filter).await
    }

    async fn store_resource_urls(&self, downloads: &[BookDownload]) -> Result<u64> {
        Catalog::store_resource_urls(self, downloads).await
    }

    async fn counts(&self) -> Result<CatalogCounts> {
        Catalog::counts(self).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn repo() -> Box<dyn CatalogRepository> {
        Box::new(Catalog::new(Database::new_in_memory().await.unwrap()))
    }

    #[tokio::test]
    async fn test_repository_trait_delegates_to_catalog() {
        let repo = repo().await;
        repo.store_profile_urls(&["/book/x/1".to_string()])
            .await
            .unwrap();
        repo.store_book_records(&[BookRecord {
            title: "X".to_string(),
            tokens: vec!["tok".to_string()],
            ..BookRecord::default()
        }])
        .await
        .unwrap();

        assert_eq!(repo.profile_urls().await.unwrap(), vec!["/book/x/1"]);
        let pending = repo.book_downloads(DownloadFilter::Unresolved).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(repo.counts().await.unwrap().downloads, 1);
    }
}
