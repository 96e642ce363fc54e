//! Error types for catalog fetches.

use thiserror::Error;

/// Errors raised by [`ResilientFetcher`](super::ResilientFetcher).
///
/// Only [`FetchError::Cancelled`] and [`FetchError::Client`] ever escape the
/// retrying [`fetch`](super::ResilientFetcher::fetch); the others describe a
/// single failed attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Building the HTTP client failed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connection, DNS, TLS or body read failure.
    #[error("network error fetching {url}: {source}")]
    Transport {
        /// The URL being fetched.
        url: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The request exceeded the per-call timeout.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL being fetched.
        url: String,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL being fetched.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The cancellation token fired before a successful attempt.
    #[error("fetch of {url} cancelled")]
    Cancelled {
        /// The URL being fetched.
        url: String,
    },
}

impl FetchError {
    /// Classifies a reqwest error raised while fetching `url`.
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Transport {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Returns true when the error is a cancellation rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let msg = FetchError::http_status("https://example.com/page/2", 503).to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("https://example.com/page/2"));
    }

    #[test]
    fn test_cancelled_flag() {
        assert!(FetchError::cancelled("https://example.com").is_cancelled());
        assert!(!FetchError::http_status("https://example.com", 500).is_cancelled());
    }
}
