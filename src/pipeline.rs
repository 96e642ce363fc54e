//! Sequences the stages for each top-level command.
//!
//! Every command reads its work set from the catalog, runs one worker pool and
//! writes the results back in a single batch once the pool has finished.
//! Workers never touch the catalog.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::catalog::{CatalogError, CatalogRepository, DownloadFilter};
use crate::config::CrawlConfig;
use crate::fetch::{FetchError, ResilientFetcher, RetryPolicy};
use crate::pool::{PoolError, WorkerPool};
use crate::site::SiteUrls;
use crate::stage::{
    Discovery, Download, DownloadOutcome, Extraction, Resolution, Stage, StageError, StageKind,
};
use crate::transfer;

#[allow(clippy::expect_used)]
static BOOK_PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/book/(.*)/[0-9]*$").expect("book path regex is valid") // Static pattern, safe to panic
});

/// Errors that end a pipeline command.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The download directory could not be created.
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Returns true when the command stopped because of cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Fetch(error) => error.is_cancelled(),
            Self::Stage(error) => error.is_cancelled(),
            Self::Pool(error) => error.is_cancelled(),
            Self::Catalog(_) | Self::OutputDir { .. } => false,
        }
    }
}

/// Result of `search`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchSummary {
    /// Listing pages announced by the pagination caption.
    pub pages: usize,
    /// Detail page paths found across all pages.
    pub found: usize,
    /// Paths not already in the catalog.
    pub stored: u64,
}

/// Profile URLs held in the catalog and how many distinct books they name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileStatus {
    pub profile_urls: usize,
    pub unique_names: usize,
}

/// Counts profile paths and the distinct book names matched by `/book/<name>/<id>`.
#[must_use]
pub fn profile_status(paths: &[String]) -> ProfileStatus {
    let names: HashSet<&str> = paths
        .iter()
        .filter_map(|path| BOOK_PATH_PATTERN.captures(path))
        .filter_map(|caps| caps.get(1))
        .map(|name| name.as_str())
        .collect();
    ProfileStatus {
        profile_urls: paths.len(),
        unique_names: names.len(),
    }
}

/// Result of `collect-book-info`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectSummary {
    pub status: ProfileStatus,
    /// Pages that yielded a titled record.
    pub extracted: usize,
    /// Newly stored book records.
    pub books: u64,
    /// Newly stored download rows.
    pub downloads: u64,
}

/// Result of `resource-url`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    /// Unresolved rows at the start of the run.
    pub pending: usize,
    /// Rows whose URL was written.
    pub resolved: u64,
}

/// Result of `download-all`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Resolved rows at the start of the run.
    pub pending: usize,
    pub saved: usize,
    pub existing: usize,
    pub skipped: usize,
}

/// Runs the crawl commands against one catalog.
pub struct Pipeline {
    config: Arc<CrawlConfig>,
    catalog: Arc<dyn CatalogRepository>,
    fetcher: ResilientFetcher,
    site: SiteUrls,
}

impl Pipeline {
    /// # Errors
    ///
    /// Returns [`PipelineError::Fetch`] if the HTTP client cannot be built.
    pub fn new(
        config: Arc<CrawlConfig>,
        catalog: Arc<dyn CatalogRepository>,
    ) -> Result<Self, PipelineError> {
        let fetcher = ResilientFetcher::new(&config)?;
        let site = SiteUrls::new(&config.base_url);
        Ok(Self {
            config,
            catalog,
            fetcher,
            site,
        })
    }

    /// Returns the shared fetcher (for retry statistics).
    #[must_use]
    pub fn fetcher(&self) -> &ResilientFetcher {
        &self.fetcher
    }

    fn pool(&self, kind: StageKind) -> WorkerPool {
        WorkerPool::new(self.config.workers.get(kind))
    }

    /// Discovers every detail page path for the configured search key and
    /// stores them.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] on cancellation or a catalog failure.
    #[instrument(skip(self, cancel), fields(search_key = %self.config.search_key))]
    pub async fn search(&self, cancel: &CancellationToken) -> Result<SearchSummary, PipelineError> {
        let discovery = Arc::new(Discovery::new(
            self.fetcher.clone(),
            self.site.clone(),
            self.config.search_key.clone(),
        ));

        let first = discovery.first_page(cancel).await?;
        info!(pages = first.page_count, "listing pages");

        let remaining: Arc<[usize]> = Discovery::remaining_pages(first.page_count).into();
        let rest = self
            .pool(discovery.kind())
            .run(Arc::clone(&discovery), remaining, cancel)
            .await?;

        let mut paths = first.paths;
        paths.extend(rest.into_iter().flatten());

        let stored = self.catalog.store_profile_urls(&paths).await?;
        let summary = SearchSummary {
            pages: first.page_count,
            found: paths.len(),
            stored,
        };
        info!(found = summary.found, stored, "search complete");
        Ok(summary)
    }

    /// Extracts a book record from every stored profile page and stores the
    /// records with their download tokens.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] on cancellation or a catalog failure.
    #[instrument(skip(self, cancel))]
    pub async fn collect_book_info(
        &self,
        cancel: &CancellationToken,
    ) -> Result<CollectSummary, PipelineError> {
        let paths = self.catalog.profile_urls().await?;
        let status = profile_status(&paths);
        info!(
            profile_urls = status.profile_urls,
            unique_names = status.unique_names,
            "profile status"
        );
        if paths.is_empty() {
            info!("no profile urls stored; run `search` first");
            return Ok(CollectSummary {
                status,
                ..CollectSummary::default()
            });
        }

        let extraction = Arc::new(Extraction::new(self.fetcher.clone(), self.site.clone()));
        let records = self
            .pool(extraction.kind())
            .run(Arc::clone(&extraction), paths.into(), cancel)
            .await?;

        let stored = self.catalog.store_book_records(&records).await?;
        let summary = CollectSummary {
            status,
            extracted: records.len(),
            books: stored.books,
            downloads: stored.downloads,
        };
        info!(
            extracted = summary.extracted,
            books = summary.books,
            downloads = summary.downloads,
            "book info collected"
        );
        Ok(summary)
    }

    /// Looks up a resource URL for every unresolved download and stores the
    /// ones that resolved.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] on cancellation or a catalog failure.
    #[instrument(skip(self, cancel))]
    pub async fn collect_resource_urls(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ResolveSummary, PipelineError> {
        let pending = self.catalog.book_downloads(DownloadFilter::Unresolved).await?;
        if pending.is_empty() {
            info!("no unresolved downloads; run `collect-book-info` first");
            return Ok(ResolveSummary::default());
        }
        let pending_count = pending.len();

        let resolution = Arc::new(Resolution::new(self.fetcher.clone(), self.site.clone()));
        let looked_up = self
            .pool(resolution.kind())
            .run(Arc::clone(&resolution), pending.into(), cancel)
            .await?;

        let resolved = self.catalog.store_resource_urls(&looked_up).await?;
        info!(pending = pending_count, resolved, "resource urls collected");
        Ok(ResolveSummary {
            pending: pending_count,
            resolved,
        })
    }

    /// Downloads every resolved resource into the output directory.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] on cancellation, a catalog failure, or when
    /// the output directory cannot be created.
    #[instrument(skip(self, cancel), fields(output_dir = %self.config.output_dir.display()))]
    pub async fn download_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DownloadSummary, PipelineError> {
        let resolved = self.catalog.book_downloads(DownloadFilter::Resolved).await?;
        if resolved.is_empty() {
            info!("no resolved downloads; run `resource-url` first");
            return Ok(DownloadSummary::default());
        }

        let output_dir = self.config.output_dir.clone();
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|source| PipelineError::OutputDir {
                path: output_dir.clone(),
                source,
            })?;

        let download = Arc::new(
            Download::new(
                transfer::from_config(&self.config)?,
                self.site.clone(),
                output_dir,
                RetryPolicy::unbounded(self.config.retry_delay),
            )
            .with_dead_host_prefixes(self.config.dead_host_prefixes.clone())
            .with_relative_marker(self.config.relative_marker.clone()),
        );

        let mut summary = DownloadSummary {
            pending: resolved.len(),
            ..DownloadSummary::default()
        };
        let outcomes = self
            .pool(download.kind())
            .run(Arc::clone(&download), resolved.into(), cancel)
            .await?;

        for outcome in outcomes {
            match outcome {
                DownloadOutcome::Saved(_) => summary.saved += 1,
                DownloadOutcome::Existing(_) => summary.existing += 1,
                DownloadOutcome::Skipped => summary.skipped += 1,
            }
        }
        info!(
            saved = summary.saved,
            existing = summary.existing,
            skipped = summary.skipped,
            retries = download.retry_events(),
            "downloads complete"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("site", &self.site)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_profile_status_counts_unique_names() {
        let status = profile_status(&paths(&[
            "/book/rust-in-action/12",
            "/book/rust-in-action/13",
            "/book/go-web/7",
            "/about",
        ]));
        assert_eq!(
            status,
            ProfileStatus {
                profile_urls: 4,
                unique_names: 2
            }
        );
    }

    #[test]
    fn test_profile_status_empty() {
        assert_eq!(profile_status(&[]), ProfileStatus::default());
    }

    #[test]
    fn test_cancellation_classification() {
        let cancelled = PipelineError::from(PoolError::Cancelled {
            stage: StageKind::Extraction,
        });
        assert!(cancelled.is_cancelled());

        let failed = PipelineError::from(PoolError::WorkerPanicked {
            stage: StageKind::Extraction,
            worker: 0,
        });
        assert!(!failed.is_cancelled());
    }
}
