//! Network fetches against the catalog site.
//!
//! - [`ResilientFetcher`] - GET with an unbounded, cancellable fixed-delay retry loop
//! - [`RetryPolicy`] - the fixed-delay policy, also used by the download stage
//! - [`build_http_client`] / [`build_transfer_client`] - clients with the fixed header set

mod client;
mod error;
mod fetcher;
mod retry;

pub use client::{build_http_client, build_transfer_client};
pub use error::FetchError;
pub use fetcher::ResilientFetcher;
pub use retry::{RetryDecision, RetryPolicy};
