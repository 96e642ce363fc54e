//! The four pipeline stages.
//!
//! Each stage is a per-item unit of work the [`WorkerPool`](crate::pool::WorkerPool)
//! runs over one partition of its input:
//!
//! | Stage        | Item                 | Output                       |
//! |--------------|----------------------|------------------------------|
//! | Discovery    | listing page number  | detail page paths            |
//! | Extraction   | detail page path     | [`BookRecord`](crate::catalog::BookRecord) |
//! | Resolution   | unresolved download  | download with resource URL   |
//! | Download     | resolved download    | [`DownloadOutcome`]          |
//!
//! Stages absorb transient and parse failures themselves. The only error that
//! is expected to leave a stage is cancellation.

mod discovery;
mod download;
mod extraction;
mod resolution;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::transfer::TransferError;

pub use discovery::{Discovery, ListingPage, pagination_count, parse_listing};
pub use download::{Download, DownloadOutcome, destination_file_name};
pub use extraction::{Extraction, parse_book_record};
pub use resolution::{LookupResponse, Resolution};

/// Identifies one of the pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Discovery,
    Extraction,
    Resolution,
    Download,
}

impl StageKind {
    /// All stages in pipeline order.
    pub const ALL: [Self; 4] = [
        Self::Discovery,
        Self::Extraction,
        Self::Resolution,
        Self::Download,
    ];

    /// Returns the stable lowercase identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Extraction => "extraction",
            Self::Resolution => "resolution",
            Self::Download => "download",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownStage(s.to_string()))
    }
}

/// Failure of a single stage item that the stage could not absorb.
#[derive(Debug, Error)]
pub enum StageError {
    /// A fetch gave up (bounded policy) or was cancelled.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A transfer gave up (bounded policy).
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The cancellation token fired.
    #[error("stage cancelled")]
    Cancelled,
}

impl StageError {
    /// Returns true when the failure is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Fetch(error) => error.is_cancelled(),
            Self::Transfer(_) => false,
        }
    }
}

/// Per-item work unit of one pipeline stage.
///
/// `Ok(None)` means the item degraded to an empty placeholder (missing title,
/// skipped URL...) and is filtered out of the aggregated results.
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    /// Input item type.
    type Item: Send + Sync + 'static;
    /// Per-item result type.
    type Output: Send + 'static;

    /// Which stage this is, for worker ceilings and logging.
    fn kind(&self) -> StageKind;

    /// Processes a single item.
    async fn process_item(
        &self,
        item: &Self::Item,
        cancel: &CancellationToken,
    ) -> Result<Option<Self::Output>, StageError>;
}
