//! Listing pages: detail page paths and pagination.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{Stage, StageError, StageKind};
use crate::document::Document;
use crate::fetch::ResilientFetcher;
use crate::site::SiteUrls;

/// Caption text such as `1 / 42 Pages`.
#[allow(clippy::expect_used)]
static PAGES_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+\s*/\s*)?(\d+)\s+Pages?\s*$").expect("pages regex is valid") // Static pattern, safe to panic
});

/// What one listing page yields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Detail page paths in document order.
    pub paths: Vec<String>,
    /// Total number of listing pages announced by the caption.
    pub page_count: usize,
}

/// Parses a listing page.
///
/// Paths come from the first link of every card; the page count falls back to
/// 1 when the caption is missing or unreadable.
#[must_use]
pub fn parse_listing(raw: &str) -> ListingPage {
    let doc = Document::parse(raw);
    let paths = doc
        .find_all("div.card-body")
        .iter()
        .filter_map(|card| card.find("a[href]"))
        .filter_map(|link| link.attr("href"))
        .map(str::to_string)
        .collect();

    ListingPage {
        paths,
        page_count: pagination_count(&doc),
    }
}

/// Reads the number of listing pages from the pagination caption.
#[must_use]
pub fn pagination_count(doc: &Document) -> usize {
    let Some(caption) = doc.find("div.pagination span.text") else {
        return 1;
    };
    let text = caption.text();
    PAGES_PATTERN
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .and_then(|count| count.as_str().parse::<usize>().ok())
        .filter(|count| *count > 0)
        .unwrap_or(1)
}

/// Discovers detail page paths for one search key.
#[derive(Debug, Clone)]
pub struct Discovery {
    fetcher: ResilientFetcher,
    site: SiteUrls,
    search_key: String,
}

impl Discovery {
    #[must_use]
    pub fn new(fetcher: ResilientFetcher, site: SiteUrls, search_key: impl Into<String>) -> Self {
        Self {
            fetcher,
            site,
            search_key: search_key.into(),
        }
    }

    /// Fetches the unnumbered first listing page, which also carries the
    /// pagination caption.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Fetch`] only when the fetch is cancelled.
    #[instrument(skip(self, cancel), fields(search_key = %self.search_key))]
    pub async fn first_page(&self, cancel: &CancellationToken) -> Result<ListingPage, StageError> {
        let url = self.site.listing(&self.search_key, None);
        let body = self.fetcher.fetch(&url, cancel).await?;
        let page = parse_listing(&body);
        debug!(
            paths = page.paths.len(),
            page_count = page.page_count,
            "parsed first listing page"
        );
        Ok(page)
    }

    /// Page numbers still to fetch after the first page.
    #[must_use]
    pub fn remaining_pages(page_count: usize) -> Vec<usize> {
        (2..=page_count).collect()
    }
}

#[async_trait]
impl Stage for Discovery {
    type Item = usize;
    type Output = Vec<String>;

    fn kind(&self) -> StageKind {
        StageKind::Discovery
    }

    async fn process_item(
        &self,
        page: &usize,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<String>>, StageError> {
        let url = self.site.listing(&self.search_key, Some(*page));
        let body = self.fetcher.fetch(&url, cancel).await?;
        let paths = parse_listing(&body).paths;
        debug!(page, paths = paths.len(), "parsed listing page");
        Ok(Some(paths))
    }
}
