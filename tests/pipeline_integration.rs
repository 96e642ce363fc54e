//! End-to-end pipeline tests against a mock catalog site.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ebook_dl_core::{Catalog, CrawlConfig, Database, DownloadFilter, Pipeline, WorkerCeilings};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEAD_HOST: &str = "http://dead.invalid";

fn listing_page(links: &[&str], caption: &str) -> String {
    let cards: String = links
        .iter()
        .map(|href| format!(r#"<div class="card-body"><a href="{href}">book</a></div>"#))
        .collect();
    format!(
        r#"<html><body>{cards}<div class="pagination"><span class="text">{caption}</span></div></body></html>"#
    )
}

fn detail_page(title: Option<&str>, tokens: &[&str]) -> String {
    let title = title
        .map(|t| format!(r#"<h3 class="product-title">{t}</h3>"#))
        .unwrap_or_default();
    let spans: String = tokens
        .iter()
        .map(|t| format!(r#"<span class="tn-download" tn-url="{t}">Download</span>"#))
        .collect();
    format!(
        r#"<html><body><section class="content">{title}
            <div class="details"><ul class="list-unstyled"><li>Year: 2020</li></ul></div>
            {spans}</section></body></html>"#
    )
}

async fn mount_html(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_lookup(server: &MockServer, token: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/download/{token}")))
        .respond_with(response)
        .mount(server)
        .await;
}

fn json(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(body.to_string())
}

async fn mock_site() -> MockServer {
    let server = MockServer::start().await;

    mount_html(
        &server,
        "/",
        listing_page(&["/book/alpha/1", "/book/beta/2"], "1 / 2 Pages"),
    )
    .await;
    mount_html(
        &server,
        "/page/2",
        listing_page(
            &["/book/gamma/3", "/book/alpha/1", "/book/untitled/4"],
            "2 / 2 Pages",
        ),
    )
    .await;

    mount_html(&server, "/book/alpha/1", detail_page(Some("Alpha"), &["tok-a"])).await;
    mount_html(
        &server,
        "/book/beta/2",
        detail_page(Some("Beta"), &["tok-b1", "tok-b2"]),
    )
    .await;
    mount_html(&server, "/book/gamma/3", detail_page(Some("Gamma"), &["tok-g"])).await;
    mount_html(&server, "/book/untitled/4", detail_page(None, &["tok-x"])).await;

    mount_lookup(&server, "tok-a", json(r#"{"ok":true,"url":"/files/Alpha Book.pdf"}"#)).await;
    mount_lookup(&server, "tok-b1", json(r#"{"ok":false,"url":""}"#)).await;
    mount_lookup(
        &server,
        "tok-b2",
        json(&format!(r#"{{"ok":true,"url":"{DEAD_HOST}/b2.pdf"}}"#)),
    )
    .await;
    mount_lookup(&server, "tok-g", ResponseTemplate::new(500)).await;

    Mock::given(method("GET"))
        .and(path("/files/Alpha%20Book.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"alpha pdf".to_vec()))
        .mount(&server)
        .await;

    server
}

fn config(server: &MockServer, output_dir: &Path) -> CrawlConfig {
    CrawlConfig {
        retry_delay: Duration::from_millis(10),
        output_dir: output_dir.to_path_buf(),
        workers: WorkerCeilings {
            discovery: 2,
            extraction: 3,
            resolution: 2,
            download: 2,
        },
        dead_host_prefixes: vec![DEAD_HOST.to_string()],
        ..CrawlConfig::with_base_url(server.uri())
    }
}

async fn pipeline(server: &MockServer, output_dir: &Path) -> (Pipeline, Catalog) {
    let catalog = Catalog::new(Database::new_in_memory().await.unwrap());
    let pipeline = Pipeline::new(
        Arc::new(config(server, output_dir)),
        Arc::new(catalog.clone()),
    )
    .unwrap();
    (pipeline, catalog)
}

#[tokio::test]
async fn test_full_pipeline_and_rerun_safety() {
    let server = mock_site().await;
    let out = TempDir::new().unwrap();
    let (pipeline, catalog) = pipeline(&server, out.path()).await;
    let cancel = CancellationToken::new();

    // search
    let search = pipeline.search(&cancel).await.unwrap();
    assert_eq!(search.pages, 2);
    assert_eq!(search.found, 5);
    assert_eq!(search.stored, 4);
    assert_eq!(
        catalog.profile_urls().await.unwrap(),
        vec![
            "/book/alpha/1",
            "/book/beta/2",
            "/book/gamma/3",
            "/book/untitled/4"
        ]
    );
    assert_eq!(pipeline.search(&cancel).await.unwrap().stored, 0);

    // collect-book-info
    let collect = pipeline.collect_book_info(&cancel).await.unwrap();
    assert_eq!(collect.status.profile_urls, 4);
    assert_eq!(collect.status.unique_names, 4);
    assert_eq!(collect.extracted, 3);
    assert_eq!(collect.books, 3);
    assert_eq!(collect.downloads, 4);

    let rerun = pipeline.collect_book_info(&cancel).await.unwrap();
    assert_eq!((rerun.books, rerun.downloads), (0, 0));

    // resource-url
    let resolve = pipeline.collect_resource_urls(&cancel).await.unwrap();
    assert_eq!(resolve.pending, 4);
    assert_eq!(resolve.resolved, 2);

    let pending: Vec<String> = catalog
        .book_downloads(DownloadFilter::Unresolved)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.token)
        .collect();
    assert_eq!(pending, vec!["tok-b1", "tok-g"]);

    let rerun = pipeline.collect_resource_urls(&cancel).await.unwrap();
    assert_eq!(rerun.pending, 2);
    assert_eq!(rerun.resolved, 0);

    // download-all
    let download = pipeline.download_all(&cancel).await.unwrap();
    assert_eq!(download.pending, 2);
    assert_eq!(download.saved, 1);
    assert_eq!(download.skipped, 1);
    let alpha_id = catalog
        .book_downloads(DownloadFilter::Resolved)
        .await
        .unwrap()
        .into_iter()
        .find(|d| d.token == "tok-a")
        .unwrap()
        .id;
    assert_eq!(
        std::fs::read(out.path().join(format!("{alpha_id}-Alpha Book.pdf"))).unwrap(),
        b"alpha pdf"
    );
    let leftovers: Vec<_> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .filter(|name| name.to_string_lossy().ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty(), "partial files left: {leftovers:?}");

    let rerun = pipeline.download_all(&cancel).await.unwrap();
    assert_eq!(rerun.saved, 0);
    assert_eq!(rerun.existing, 1);
    assert_eq!(rerun.skipped, 1);
}

#[tokio::test]
async fn test_missing_title_stores_nothing() {
    let server = MockServer::start().await;
    mount_html(&server, "/", listing_page(&["/book/untitled/4"], "1 / 1 Pages")).await;
    mount_html(&server, "/book/untitled/4", detail_page(None, &["tok-x"])).await;

    let out = TempDir::new().unwrap();
    let (pipeline, catalog) = pipeline(&server, out.path()).await;
    let cancel = CancellationToken::new();

    pipeline.search(&cancel).await.unwrap();
    let collect = pipeline.collect_book_info(&cancel).await.unwrap();
    assert_eq!(collect.extracted, 0);

    let counts = catalog.counts().await.unwrap();
    assert_eq!(counts.profiles, 1);
    assert_eq!(counts.books, 0);
    assert_eq!(counts.downloads, 0);
}

#[tokio::test]
async fn test_search_key_uses_search_urls() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/search/rust",
        listing_page(&["/book/rust/1"], "1 / 3 Pages"),
    )
    .await;
    mount_html(&server, "/search/rust/2", listing_page(&["/book/rust/2"], "")).await;
    mount_html(&server, "/search/rust/3", listing_page(&["/book/rust/3"], "")).await;

    let out = TempDir::new().unwrap();
    let catalog = Catalog::new(Database::new_in_memory().await.unwrap());
    let keyed = CrawlConfig {
        search_key: "rust".to_string(),
        ..config(&server, out.path())
    };
    let pipeline = Pipeline::new(Arc::new(keyed), Arc::new(catalog.clone())).unwrap();

    let summary = pipeline.search(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.pages, 3);
    assert_eq!(
        catalog.profile_urls().await.unwrap(),
        vec!["/book/rust/1", "/book/rust/2", "/book/rust/3"]
    );
}

#[tokio::test]
async fn test_empty_catalog_commands_return_empty_summaries() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let (pipeline, _) = pipeline(&server, out.path()).await;
    let cancel = CancellationToken::new();

    let collect = pipeline.collect_book_info(&cancel).await.unwrap();
    assert_eq!(collect.status.profile_urls, 0);
    assert_eq!(pipeline.collect_resource_urls(&cancel).await.unwrap().pending, 0);
    assert_eq!(pipeline.download_all(&cancel).await.unwrap().pending, 0);
    assert!(
        server.received_requests().await.unwrap().is_empty(),
        "empty work sets must not touch the network"
    );
}

#[tokio::test]
async fn test_cancel_interrupts_endless_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();
    let (pipeline, catalog) = pipeline(&server, out.path()).await;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = pipeline.search(&cancel).await.unwrap_err();
    assert!(err.is_cancelled(), "unexpected error: {err}");
    assert!(pipeline.fetcher().retry_events() >= 1);
    assert_eq!(catalog.counts().await.unwrap().profiles, 0);
}
