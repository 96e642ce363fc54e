//! Crawl configuration passed explicitly to the fetcher, stages and pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::stage::StageKind;

/// Default catalog site.
pub const DEFAULT_BASE_URL: &str = "https://itebooksfree.com";

/// Default browser-like User-Agent sent with every catalog request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 3578.98 Safari/537.36";

/// Per-request timeout for catalog fetches (15 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Fixed pause between retries of a failed fetch or transfer (1 second).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default database file, relative to the working directory.
pub const DEFAULT_DATABASE_PATH: &str = "ebook-dl.db";

/// Default download directory.
pub const DEFAULT_OUTPUT_DIR: &str = "downloads";

/// Marker that identifies a site-relative resource URL.
pub const DEFAULT_RELATIVE_MARKER: &str = "/";

const MAX_WORKERS: usize = 1000;
const MAX_TIMEOUT_SECS: u64 = 3600;
const MAX_RETRY_DELAY_MS: u128 = 60_000;

/// Configuration errors. All of them are fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A stage identifier that names no pipeline stage.
    #[error("unknown stage '{0}'\n  Suggestion: Use one of: discovery, extraction, resolution, download")]
    UnknownStage(String),

    /// A value outside its accepted range or format.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// Offending setting.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Static worker ceiling per pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerCeilings {
    pub discovery: usize,
    pub extraction: usize,
    pub resolution: usize,
    pub download: usize,
}

impl Default for WorkerCeilings {
    fn default() -> Self {
        Self {
            discovery: 200,
            extraction: 130,
            resolution: 130,
            download: 100,
        }
    }
}

impl WorkerCeilings {
    /// Returns the ceiling configured for `kind`.
    #[must_use]
    pub fn get(&self, kind: StageKind) -> usize {
        match kind {
            StageKind::Discovery => self.discovery,
            StageKind::Extraction => self.extraction,
            StageKind::Resolution => self.resolution,
            StageKind::Download => self.download,
        }
    }

    /// Overrides the ceiling for `kind`.
    pub fn set(&mut self, kind: StageKind, workers: usize) {
        match kind {
            StageKind::Discovery => self.discovery = workers,
            StageKind::Extraction => self.extraction = workers,
            StageKind::Resolution => self.resolution = workers,
            StageKind::Download => self.download = workers,
        }
    }
}

/// Everything a crawl run needs to know, built once and shared read-only.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Catalog site root, without trailing slash.
    pub base_url: String,
    /// Search keyword; empty browses the whole catalog.
    pub search_key: String,
    /// User-Agent header for catalog and lookup requests.
    pub user_agent: String,
    /// Timeout applied to each individual request.
    pub request_timeout: Duration,
    /// Pause between retries of a failed fetch or transfer.
    pub retry_delay: Duration,
    /// Directory receiving downloaded files.
    pub output_dir: PathBuf,
    /// SQLite catalog file.
    pub database_path: PathBuf,
    /// Worker ceilings per stage.
    pub workers: WorkerCeilings,
    /// Resource URLs starting with any of these are skipped permanently.
    pub dead_host_prefixes: Vec<String>,
    /// Prefix identifying resource URLs relative to the catalog site.
    pub relative_marker: String,
    /// External download program template using `{url}` and `{dest}` placeholders.
    /// `None` selects the built-in streaming HTTP transfer.
    pub download_command: Option<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            search_key: String::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            workers: WorkerCeilings::default(),
            dead_host_prefixes: Vec::new(),
            relative_marker: DEFAULT_RELATIVE_MARKER.to_string(),
            download_command: None,
        }
    }
}

impl CrawlConfig {
    /// Creates a config pointing at `base_url` with defaults for everything else.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            ..Self::default()
        }
    }

    /// Checks ranges and formats, normalizing the base URL in place.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first offending value.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let parsed = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::invalid("base_url", format!("{e}: {}", self.base_url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "base_url",
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }
        self.base_url = normalize_base_url(&self.base_url);

        for kind in StageKind::ALL {
            let workers = self.workers.get(kind);
            if !(1..=MAX_WORKERS).contains(&workers) {
                return Err(ConfigError::invalid(
                    "workers",
                    format!("{kind} ceiling {workers} outside 1..={MAX_WORKERS}"),
                ));
            }
        }

        let timeout_secs = self.request_timeout.as_secs();
        if !(1..=MAX_TIMEOUT_SECS).contains(&timeout_secs) {
            return Err(ConfigError::invalid(
                "request_timeout_secs",
                format!("{timeout_secs} outside 1..={MAX_TIMEOUT_SECS}"),
            ));
        }

        let delay_ms = self.retry_delay.as_millis();
        if !(1..=MAX_RETRY_DELAY_MS).contains(&delay_ms) {
            return Err(ConfigError::invalid(
                "retry_delay_ms",
                format!("{delay_ms} outside 1..={MAX_RETRY_DELAY_MS}"),
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::invalid("user_agent", "must not be empty"));
        }

        if let Some(command) = &self.download_command {
            for placeholder in ["{url}", "{dest}"] {
                if !command.contains(placeholder) {
                    return Err(ConfigError::invalid(
                        "download_command",
                        format!("template must contain a {placeholder} placeholder"),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
