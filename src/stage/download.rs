//! Resolved resource URLs to local files.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{Stage, StageError, StageKind};
use crate::catalog::BookDownload;
use crate::fetch::{RetryDecision, RetryPolicy};
use crate::site::SiteUrls;
use crate::transfer::{Transfer, TransferError};

/// What happened to one resolved download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Transferred into this file.
    Saved(PathBuf),
    /// This row's file was completed by an earlier run.
    Existing(PathBuf),
    /// The URL points at a dead host and is never attempted.
    Skipped,
}

/// Downloads resolved resource URLs, retrying failed transfers.
pub struct Download {
    transfer: Box<dyn Transfer>,
    site: SiteUrls,
    output_dir: PathBuf,
    dead_host_prefixes: Vec<String>,
    relative_marker: String,
    policy: RetryPolicy,
    retry_events: Arc<AtomicU64>,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("output_dir", &self.output_dir)
            .field("dead_host_prefixes", &self.dead_host_prefixes)
            .field("relative_marker", &self.relative_marker)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Download {
    #[must_use]
    pub fn new(
        transfer: Box<dyn Transfer>,
        site: SiteUrls,
        output_dir: impl Into<PathBuf>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transfer,
            site,
            output_dir: output_dir.into(),
            dead_host_prefixes: Vec::new(),
            relative_marker: crate::config::DEFAULT_RELATIVE_MARKER.to_string(),
            policy,
            retry_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// URLs starting with any of these prefixes are skipped.
    #[must_use]
    pub fn with_dead_host_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.dead_host_prefixes = prefixes;
        self
    }

    /// Prefix marking a resource URL as relative to the catalog site.
    #[must_use]
    pub fn with_relative_marker(mut self, marker: impl Into<String>) -> Self {
        self.relative_marker = marker.into();
        self
    }

    /// Failed transfer attempts that were retried.
    #[must_use]
    pub fn retry_events(&self) -> u64 {
        self.retry_events.load(Ordering::SeqCst)
    }

    fn is_dead_host(&self, url: &str) -> bool {
        self.dead_host_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && url.starts_with(prefix.as_str()))
    }

    /// Absolute URL to request for a stored resource URL.
    #[must_use]
    pub fn request_url(&self, resource_url: &str) -> String {
        if self.relative_marker.is_empty() || !resource_url.starts_with(&self.relative_marker) {
            return resource_url.to_string();
        }
        let (dir, name) = resource_url
            .rsplit_once('/')
            .unwrap_or(("", resource_url));
        let name = urlencoding::decode(name).map_or_else(|_| name.to_string(), |n| n.into_owned());
        self.site
            .absolute(&format!("{dir}/{}", urlencoding::encode(&name)))
    }

    async fn transfer_with_retry(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), StageError> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            attempt = attempt.saturating_add(1);

            let error = match self.transfer.transfer(url, dest).await {
                Ok(()) => return Ok(()),
                Err(error) => error,
            };

            match self.policy.should_retry(attempt) {
                RetryDecision::Retry { delay, .. } => {
                    self.retry_events.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        error = %error,
                        retry = attempt,
                        delay_ms = delay.as_millis(),
                        "transfer failed; retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(StageError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(%reason, "not retrying transfer");
                    return Err(error.into());
                }
            }
        }
    }
}

#[async_trait]
impl Stage for Download {
    type Item = BookDownload;
    type Output = DownloadOutcome;

    fn kind(&self) -> StageKind {
        StageKind::Download
    }

    #[instrument(skip(self, download, cancel), fields(id = download.id))]
    async fn process_item(
        &self,
        download: &BookDownload,
        cancel: &CancellationToken,
    ) -> Result<Option<DownloadOutcome>, StageError> {
        if self.is_dead_host(&download.resource_url) {
            debug!(url = %download.resource_url, "dead host; skipped");
            return Ok(Some(DownloadOutcome::Skipped));
        }

        let url = self.request_url(&download.resource_url);
        let file_name = destination_file_name(&url, download.id);
        let dest = self.output_dir.join(&file_name);
        if dest.is_file() {
            debug!(dest = %dest.display(), "already downloaded");
            return Ok(Some(DownloadOutcome::Existing(dest)));
        }

        let partial = self.output_dir.join(format!("{file_name}{PARTIAL_SUFFIX}"));
        if let Err(error) = self.transfer_with_retry(&url, &partial, cancel).await {
            remove_partial(&partial).await;
            return Err(error);
        }
        tokio::fs::rename(&partial, &dest)
            .await
            .map_err(|source| TransferError::Io {
                path: dest.clone(),
                source,
            })?;

        info!(dest = %dest.display(), "saved");
        Ok(Some(DownloadOutcome::Saved(dest)))
    }
}

/// Transfers land here first and are renamed into place once complete.
const PARTIAL_SUFFIX: &str = ".part";

async fn remove_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => debug!(path = %partial.display(), "removed partial file"),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => warn!(path = %partial.display(), %error, "failed to remove partial file"),
    }
}

/// File name for download row `id`: `{id}-` followed by the decoded last path
/// segment of `url` made safe for common filesystems, or `download-{id}.bin`
/// when there is no usable segment. Distinct rows never share a name.
#[must_use]
pub fn destination_file_name(url: &str, id: i64) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .or_else(|| url.rsplit('/').next().map(str::to_string))
        .unwrap_or_default();
    let decoded = urlencoding::decode(&segment).map_or(segment.clone(), |d| d.into_owned());

    let name = sanitize_filename(decoded.trim());
    if name.trim_matches('_').is_empty() {
        format!("download-{id}.bin")
    } else {
        format!("{id}-{name}")
    }
}

/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if is_plain_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

fn is_plain_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
