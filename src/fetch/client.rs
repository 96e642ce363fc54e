//! Shared HTTP client construction for catalog and lookup requests.

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder};

use super::FetchError;
use crate::config::CrawlConfig;

const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.5";

/// Builds the client every catalog request goes through.
///
/// Carries the fixed header set (configured User-Agent included) and the
/// per-request timeout from `config`.
///
/// # Errors
///
/// Returns [`FetchError::Client`] when client construction fails, for example
/// when the User-Agent is not a valid header value.
pub fn build_http_client(config: &CrawlConfig) -> Result<Client, FetchError> {
    base_builder(config)
        .timeout(config.request_timeout)
        .build()
        .map_err(FetchError::Client)
}

/// Builds the client used for file transfers.
///
/// Same headers as [`build_http_client`], but the timeout applies to each read
/// rather than the whole body so large files are not cut off.
///
/// # Errors
///
/// Returns [`FetchError::Client`] when client construction fails.
pub fn build_transfer_client(config: &CrawlConfig) -> Result<Client, FetchError> {
    base_builder(config)
        .read_timeout(config.request_timeout)
        .build()
        .map_err(FetchError::Client)
}

fn base_builder(config: &CrawlConfig) -> ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));

    Client::builder()
        .default_headers(headers)
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.request_timeout)
        .gzip(true)
}
