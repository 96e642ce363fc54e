//! Integration tests for the resilient fetcher.

use std::time::Duration;

use ebook_dl_core::{CrawlConfig, ResilientFetcher};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config(server: &MockServer) -> CrawlConfig {
    CrawlConfig {
        retry_delay: Duration::from_millis(10),
        ..CrawlConfig::with_base_url(server.uri())
    }
}

#[tokio::test]
async fn test_fetch_fails_twice_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>finally</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ResilientFetcher::new(&fast_config(&server)).unwrap();
    let body = fetcher
        .fetch(&format!("{}/flaky", server.uri()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(body, "<html>finally</html>");
    assert_eq!(fetcher.retry_events(), 2);
}

#[tokio::test]
async fn test_fetch_retries_slow_responses_past_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(3)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_string("on time"))
        .mount(&server)
        .await;

    let config = CrawlConfig {
        request_timeout: Duration::from_secs(1),
        ..fast_config(&server)
    };
    let fetcher = ResilientFetcher::new(&config).unwrap();
    let body = fetcher
        .fetch(&format!("{}/slow", server.uri()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(body, "on time");
    assert_eq!(fetcher.retry_events(), 1);
}

#[tokio::test]
async fn test_clones_share_retry_counter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let fetcher = ResilientFetcher::new(&fast_config(&server)).unwrap();
    let clone = fetcher.clone();
    clone
        .fetch(&format!("{}/a", server.uri()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(fetcher.retry_events(), 1);
}
