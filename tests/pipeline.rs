//! End-to-end tests for the discovery pipeline.
//!
//! Each test builds its own engine with fresh stores and serves pages from a
//! wiremock server. Private-host blocking is off so 127.0.0.1 is reachable.

use feedscout::content::{HttpFetcher, PageAcquirer, RenderError, Renderer};
use feedscout::engine::{
    report, DeliverySource, EngineOptions, FeedEngine, FeedRequest, PipelineError, ProgressEvent,
    VecSink,
};
use feedscout::feed::DEFAULT_SELECTORS;
use feedscout::storage::{FeedCache, ResultCache, ThrottleGuard};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <id>urn:example</id>
  <updated>2024-05-01T00:00:00Z</updated>
  <entry>
    <id>urn:example:1</id>
    <title>First</title>
    <updated>2024-05-01T00:00:00Z</updated>
    <link href="https://example.com/1"/>
  </entry>
</feed>"#;

const THREE_ARTICLES: &str = r#"<html><body>
    <article><a href="/a">Story A</a><p>About A</p></article>
    <article><a href="/b">Story B</a><p>About B</p></article>
    <article><a href="/c">Story C</a><p>About C</p></article>
</body></html>"#;

struct Harness {
    engine: FeedEngine,
    cache: Arc<ResultCache>,
}

fn harness(throttle_window: Duration, renderer: Option<Arc<dyn Renderer>>) -> Harness {
    let client = HttpFetcher::build_client("feedscout-test", "en").unwrap();
    let fetcher = HttpFetcher::new(client, Duration::from_secs(5), 1024 * 1024);
    let cache = Arc::new(ResultCache::new(Duration::from_secs(600), 64));
    let options = EngineOptions {
        block_private_hosts: false,
        ..EngineOptions::default()
    };

    let engine = FeedEngine::new(
        Arc::new(ThrottleGuard::new(throttle_window, 64)),
        cache.clone(),
        PageAcquirer::new(renderer, fetcher, Duration::from_secs(5)),
        options,
    );
    Harness { engine, cache }
}

fn default_harness() -> Harness {
    harness(Duration::from_secs(5), None)
}

async fn serve_html(server: &MockServer, at: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

fn entry_count(document: &str) -> usize {
    feed_rs::parser::parse(document.as_bytes())
        .unwrap()
        .entries
        .len()
}

/// Renderer double that serves fixed HTML and counts calls.
struct StaticRenderer {
    html: Option<&'static str>,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl Renderer for StaticRenderer {
    async fn render(&self, _url: &Url, _timeout: Duration) -> Result<String, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.html
            .map(str::to_owned)
            .ok_or_else(|| RenderError::Navigation("net::ERR_ABORTED".to_string()))
    }
}

// ============================================================================
// Gates: validation, throttle, cache
// ============================================================================

#[tokio::test]
async fn test_invalid_urls_fail_before_any_work() {
    let h = default_harness();

    for raw in ["", "not a url", "ftp://example.com/file", "javascript:alert(1)"] {
        let mut sink = VecSink::default();
        let err = h
            .engine
            .run(&FeedRequest::new(raw), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)), "{raw}: {err}");
        assert!(sink.events().is_empty());
    }
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn test_second_request_within_window_is_throttled() {
    let server = MockServer::start().await;
    serve_html(&server, "/news", THREE_ARTICLES).await;
    let h = default_harness();
    let request = FeedRequest::new(format!("{}/news", server.uri()));

    h.engine
        .run(&request, &mut VecSink::default())
        .await
        .unwrap();
    let err = h
        .engine
        .run(&request, &mut VecSink::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Throttled(_)));
    assert_eq!(err.status_code(), 429);
}

#[tokio::test]
async fn test_cache_round_trip_skips_acquisition() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(THREE_ARTICLES, "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(Duration::ZERO, None);
    let request = FeedRequest::new(format!("{}/news", server.uri()));

    let first = h
        .engine
        .run(&request, &mut VecSink::default())
        .await
        .unwrap();
    let mut sink = VecSink::default();
    let second = h.engine.run(&request, &mut sink).await.unwrap();

    assert_eq!(second.source, DeliverySource::Cache);
    assert_eq!(second.document, first.document);
    assert!(sink.progress_messages().iter().any(|m| m.contains("Cache hit")));
}

#[tokio::test]
async fn test_cache_keys_are_not_normalized() {
    let server = MockServer::start().await;
    serve_html(&server, "/news", THREE_ARTICLES).await;
    let h = harness(Duration::ZERO, None);

    let plain = format!("{}/news", server.uri());
    h.engine
        .run(&FeedRequest::new(plain.clone()), &mut VecSink::default())
        .await
        .unwrap();

    assert!(h.cache.get(&plain).is_some());
    assert!(h.cache.get(&format!("{plain}?")).is_none());
}

// ============================================================================
// Feed location
// ============================================================================

#[tokio::test]
async fn test_feed_content_type_is_returned_directly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ATOM, "application/atom+xml"))
        .expect(1)
        .mount(&server)
        .await;

    let h = default_harness();
    let url = format!("{}/feed.xml", server.uri());
    let delivery = h
        .engine
        .run(&FeedRequest::new(url.clone()), &mut VecSink::default())
        .await
        .unwrap();

    assert_eq!(delivery.source, DeliverySource::DirectFeed);
    assert_eq!(delivery.document, ATOM);
    assert_eq!(delivery.feed_url.as_deref(), Some(url.as_str()));
    assert_eq!(h.cache.get(&url).as_deref(), Some(ATOM));
}

#[tokio::test]
async fn test_linked_atom_feed_is_fetched_and_cached_under_page_key() {
    let server = MockServer::start().await;
    serve_html(
        &server,
        "/blog",
        r#"<html><head><link rel="alternate" type="application/atom+xml" href="/feed"></head>
        <body><article><a href="/a">Should not be scraped</a></article></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ATOM))
        .expect(1)
        .mount(&server)
        .await;

    let h = default_harness();
    let page = format!("{}/blog", server.uri());
    let delivery = h
        .engine
        .run(&FeedRequest::new(page.clone()), &mut VecSink::default())
        .await
        .unwrap();

    assert_eq!(delivery.source, DeliverySource::LocatedFeed);
    assert_eq!(delivery.document, ATOM);
    assert_eq!(
        delivery.feed_url.as_deref(),
        Some(format!("{}/feed", server.uri()).as_str())
    );
    assert_eq!(h.cache.get(&page).as_deref(), Some(ATOM));
}

#[tokio::test]
async fn test_broken_linked_feed_falls_through_to_extraction() {
    let server = MockServer::start().await;
    serve_html(
        &server,
        "/blog",
        r#"<html><head><link type="application/rss+xml" href="/missing.xml"></head>
        <body><article><a href="/a">Story A</a></article></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/missing.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let h = default_harness();
    let mut sink = VecSink::default();
    let delivery = h
        .engine
        .run(&FeedRequest::new(format!("{}/blog", server.uri())), &mut sink)
        .await
        .unwrap();

    assert_eq!(delivery.source, DeliverySource::Synthesized { items: 1 });
    assert!(sink
        .progress_messages()
        .iter()
        .any(|m| m.contains("extracting articles instead")));
}

// ============================================================================
// Extraction and synthesis
// ============================================================================

#[tokio::test]
async fn test_three_articles_synthesized() {
    let server = MockServer::start().await;
    serve_html(&server, "/news", THREE_ARTICLES).await;
    let h = default_harness();

    let delivery = h
        .engine
        .run(
            &FeedRequest::new(format!("{}/news", server.uri())),
            &mut VecSink::default(),
        )
        .await
        .unwrap();

    assert_eq!(delivery.source, DeliverySource::Synthesized { items: 3 });
    assert!(delivery.feed_url.is_none());
    assert_eq!(entry_count(&delivery.document), 3);
    assert!(delivery.document.contains("<![CDATA[About A]]>"));
}

#[tokio::test]
async fn test_channel_names_the_requested_url() {
    let server = MockServer::start().await;
    serve_html(&server, "/", THREE_ARTICLES).await;
    let h = default_harness();

    // Parsing would add a trailing slash; the channel keeps the raw string
    let raw = server.uri();
    let delivery = h
        .engine
        .run(&FeedRequest::new(raw.clone()), &mut VecSink::default())
        .await
        .unwrap();

    assert!(delivery
        .document
        .contains(&format!("<title>Generated RSS for {raw}</title>")));
    assert!(delivery.document.contains(&format!("<link>{raw}</link>")));
}

#[tokio::test]
async fn test_heuristic_fallback_used_when_selectors_miss() {
    let server = MockServer::start().await;
    serve_html(
        &server,
        "/",
        r#"<html><body><div><a href="/2024/05/01/council-budget">Council approves new budget</a></div></body></html>"#,
    )
    .await;
    let h = default_harness();
    let mut sink = VecSink::default();

    let delivery = h
        .engine
        .run(&FeedRequest::new(format!("{}/", server.uri())), &mut sink)
        .await
        .unwrap();

    assert_eq!(delivery.source, DeliverySource::Synthesized { items: 1 });
    let feed = feed_rs::parser::parse(delivery.document.as_bytes()).unwrap();
    assert_eq!(feed.entries.len(), 1);
    let summary = feed.entries[0].summary.as_ref();
    assert!(summary.map_or(true, |s| s.content.trim().is_empty()));
    assert!(sink
        .progress_messages()
        .iter()
        .any(|m| m.contains("scanning all links")));
}

#[tokio::test]
async fn test_heuristic_after_caller_selector_misses() {
    let server = MockServer::start().await;
    serve_html(
        &server,
        "/",
        r#"<html><body><a href="/news/2024/05/01/x">Council approves new budget</a></body></html>"#,
    )
    .await;
    let h = default_harness();

    let delivery = h
        .engine
        .run(
            &FeedRequest::new(format!("{}/", server.uri())).with_selector(".nothing a"),
            &mut VecSink::default(),
        )
        .await
        .unwrap();

    assert_eq!(delivery.source, DeliverySource::Synthesized { items: 1 });
    assert!(delivery
        .document
        .contains(&format!("{}/news/2024/05/01/x", server.uri())));
}

#[tokio::test]
async fn test_at_most_ten_items() {
    let server = MockServer::start().await;
    let links: String = (0..25)
        .map(|i| format!(r#"<h2><a href="/story/{i}">Story number {i}</a></h2>"#))
        .collect();
    serve_html(&server, "/list", &format!("<html><body>{links}</body></html>")).await;
    let h = default_harness();

    let delivery = h
        .engine
        .run(
            &FeedRequest::new(format!("{}/list", server.uri())),
            &mut VecSink::default(),
        )
        .await
        .unwrap();

    assert_eq!(delivery.source, DeliverySource::Synthesized { items: 10 });
    let feed = feed_rs::parser::parse(delivery.document.as_bytes()).unwrap();
    let titles: Vec<String> = feed
        .entries
        .iter()
        .filter_map(|e| e.title.as_ref().map(|t| t.content.clone()))
        .collect();
    let expected: Vec<String> = (0..10).map(|i| format!("Story number {i}")).collect();
    assert_eq!(titles, expected);
}

#[tokio::test]
async fn test_custom_selector_is_sole_strategy() {
    let server = MockServer::start().await;
    serve_html(&server, "/news", THREE_ARTICLES).await;
    let h = default_harness();

    let err = h
        .engine
        .run(
            &FeedRequest::new(format!("{}/news", server.uri())).with_selector(".missing a"),
            &mut VecSink::default(),
        )
        .await
        .unwrap_err();

    // The heuristic scan finds nothing article-like in /a, /b, /c either
    match err {
        PipelineError::NoArticlesFound { tried } => assert_eq!(tried, vec![".missing a"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_no_articles_reports_every_selector() {
    let server = MockServer::start().await;
    serve_html(&server, "/empty", "<html><body><p>Nothing here</p></body></html>").await;
    let h = default_harness();

    let err = h
        .engine
        .run(
            &FeedRequest::new(format!("{}/empty", server.uri())),
            &mut VecSink::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 404);
    let tried: Vec<&str> = err
        .tried_selectors()
        .unwrap()
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(tried, DEFAULT_SELECTORS.to_vec());
    assert!(h.cache.is_empty());
}

// ============================================================================
// Acquisition
// ============================================================================

#[tokio::test]
async fn test_rendered_page_skips_plain_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let renderer = Arc::new(StaticRenderer {
        html: Some(THREE_ARTICLES),
        calls: AtomicUsize::new(0),
    });
    let h = harness(Duration::from_secs(5), Some(renderer.clone()));

    let delivery = h
        .engine
        .run(
            &FeedRequest::new(format!("{}/news", server.uri())),
            &mut VecSink::default(),
        )
        .await
        .unwrap();

    assert_eq!(delivery.source, DeliverySource::Synthesized { items: 3 });
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_render_failure_falls_back_to_fetch() {
    let server = MockServer::start().await;
    serve_html(&server, "/news", THREE_ARTICLES).await;
    let renderer = Arc::new(StaticRenderer {
        html: None,
        calls: AtomicUsize::new(0),
    });
    let h = harness(Duration::from_secs(5), Some(renderer));

    let delivery = h
        .engine
        .run(
            &FeedRequest::new(format!("{}/news", server.uri())),
            &mut VecSink::default(),
        )
        .await
        .unwrap();
    assert_eq!(delivery.source, DeliverySource::Synthesized { items: 3 });
}

#[tokio::test]
async fn test_blocked_page_maps_to_503() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let h = default_harness();

    let err = h
        .engine
        .run(
            &FeedRequest::new(format!("{}/news", server.uri())),
            &mut VecSink::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Acquisition(_)));
    assert_eq!(err.status_code(), 503);
}

// ============================================================================
// Progress reporting
// ============================================================================

#[tokio::test]
async fn test_report_ends_with_success_then_end() {
    let server = MockServer::start().await;
    serve_html(&server, "/news", THREE_ARTICLES).await;
    let h = default_harness();
    let mut sink = VecSink::default();

    report(
        &h.engine,
        &FeedRequest::new(format!("{}/news", server.uri())),
        &mut sink,
    )
    .await;

    let events = sink.into_events();
    assert!(events.len() >= 3);
    assert!(matches!(events[0], ProgressEvent::Progress(_)));
    assert!(matches!(events[events.len() - 2], ProgressEvent::Success(_)));
    assert!(matches!(events[events.len() - 1], ProgressEvent::End));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_report_failure_for_invalid_url() {
    let h = default_harness();
    let mut sink = VecSink::default();
    report(&h.engine, &FeedRequest::new("nope"), &mut sink).await;

    let events = sink.into_events();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[0],
        ProgressEvent::Failure(PipelineError::Validation(_))
    ));
    assert!(matches!(events[1], ProgressEvent::End));
}

// ============================================================================
// Feed check
// ============================================================================

#[tokio::test]
async fn test_check_feed_finds_link_without_throttle() {
    let server = MockServer::start().await;
    serve_html(
        &server,
        "/blog",
        r#"<html><head><link type="application/rss+xml" href="/rss.xml"></head></html>"#,
    )
    .await;
    let h = default_harness();
    let url = format!("{}/blog", server.uri());

    for _ in 0..2 {
        let found = h.engine.check_feed(&url).await.unwrap();
        assert_eq!(
            found.map(String::from),
            Some(format!("{}/rss.xml", server.uri()))
        );
    }
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn test_check_feed_none_for_plain_page() {
    let server = MockServer::start().await;
    serve_html(&server, "/plain", THREE_ARTICLES).await;
    let h = default_harness();

    let found = h
        .engine
        .check_feed(&format!("{}/plain", server.uri()))
        .await
        .unwrap();
    assert!(found.is_none());
}
