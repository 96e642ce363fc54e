//! Token lookups: fill in a download's resource URL.
//!
//! The lookup is a single attempt. Any failure leaves the URL empty so the row
//! stays unresolved and is picked up again by the next run.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{Stage, StageError, StageKind};
use crate::catalog::BookDownload;
use crate::fetch::{FetchError, ResilientFetcher};
use crate::site::SiteUrls;

/// Envelope returned by the lookup endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LookupResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub url: String,
}

impl LookupResponse {
    /// The adopted resource URL, empty unless the lookup succeeded.
    #[must_use]
    pub fn resource_url(self) -> String {
        if self.ok { self.url } else { String::new() }
    }
}

/// Resolves download tokens to resource URLs.
#[derive(Debug, Clone)]
pub struct Resolution {
    fetcher: ResilientFetcher,
    site: SiteUrls,
}

impl Resolution {
    #[must_use]
    pub fn new(fetcher: ResilientFetcher, site: SiteUrls) -> Self {
        Self { fetcher, site }
    }

    async fn lookup(&self, token: &str) -> Result<String, FetchError> {
        let url = self.site.lookup(token);
        let body = self.fetcher.fetch_once(&url).await?;
        match serde_json::from_str::<LookupResponse>(&body) {
            Ok(response) => Ok(response.resource_url()),
            Err(error) => {
                debug!(error = %error, "lookup response is not a valid envelope");
                Ok(String::new())
            }
        }
    }
}

#[async_trait]
impl Stage for Resolution {
    type Item = BookDownload;
    type Output = BookDownload;

    fn kind(&self) -> StageKind {
        StageKind::Resolution
    }

    #[instrument(skip(self, download, cancel), fields(id = download.id, token = %download.token))]
    async fn process_item(
        &self,
        download: &BookDownload,
        cancel: &CancellationToken,
    ) -> Result<Option<BookDownload>, StageError> {
        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }

        let resource_url = match self.lookup(&download.token).await {
            Ok(url) => url,
            Err(error) => {
                debug!(error = %error, "lookup failed; left unresolved");
                String::new()
            }
        };

        Ok(Some(BookDownload {
            resource_url,
            ..download.clone()
        }))
    }
}
