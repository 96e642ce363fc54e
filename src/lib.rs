//! ebook-dl Core Library
//!
//! This library crawls a paginated ebook catalog, extracts per-book metadata,
//! resolves download tokens to resource URLs and downloads the files. Every
//! stage runs over a fixed-size pool of workers, each owning one contiguous
//! partition of the stage's input.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`partition`] - Even contiguous split of a workload across workers
//! - [`fetch`] - HTTP fetches with an unbounded, cancellable retry loop
//! - [`pool`] - Worker pool running one stage, results kept in input order
//! - [`stage`] - Discovery, extraction, resolution and download stages
//! - [`document`] - CSS-selector view over parsed catalog markup
//! - [`site`] - URL layout of the catalog site
//! - [`db`] - Database connection and schema management
//! - [`catalog`] - Idempotent storage of profile paths, books and downloads
//! - [`transfer`] - Built-in HTTP and external-command file transfers
//! - [`config`] - Explicit crawl configuration
//! - [`pipeline`] - The four commands: search, collect book info, resolve, download

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod config;
pub mod db;
pub mod document;
pub mod fetch;
pub mod partition;
pub mod pipeline;
pub mod pool;
pub mod site;
pub mod stage;
pub mod transfer;

// Re-export commonly used types
pub use catalog::{
    BookDownload, BookRecord, Catalog, CatalogCounts, CatalogError, CatalogRepository,
    DbErrorKind, DownloadFilter, StoredBooks,
};
pub use config::{ConfigError, CrawlConfig, WorkerCeilings};
pub use db::{Database, DbError};
pub use fetch::{FetchError, ResilientFetcher, RetryDecision, RetryPolicy};
pub use partition::{Partition, partition};
pub use pipeline::{
    CollectSummary, DownloadSummary, Pipeline, PipelineError, ProfileStatus, ResolveSummary,
    SearchSummary, profile_status,
};
pub use pool::{PoolError, WorkerPool};
pub use site::SiteUrls;
pub use stage::{Stage, StageError, StageKind};
pub use transfer::{CommandTransfer, HttpTransfer, Transfer, TransferError};
