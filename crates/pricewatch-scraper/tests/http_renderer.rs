//! Integration tests for `HttpRenderer` and the fetcher/crawler stack on top
//! of it.
//!
//! Uses `wiremock` to stand up a local HTTP server for each test so no real
//! network traffic is made.

use std::sync::Arc;
use std::time::Duration;

use pricewatch_core::{Category, PageShape, RetryPolicy};
use pricewatch_scraper::{
    CategoryCrawler, CrawlSettings, FetchSettings, HttpRenderer, PageFetcher, PageRenderer,
    PageRequest, RendererSettings, ScraperError, SelectorExtractor,
};
use rust_decimal::Decimal;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING: &str = r#"<html><body>
<div class="totalProductCount-a"><span>2 ürün</span></div>
<ul>
<li class="productListContent-a"><a class="productCardLink-module_a" href="/dji-neo-p-HBCV00006Y4HTL"><h2 class="title-module_titleRoot_a"><span>DJI Neo</span></h2><div class="price-module_finalPrice_a">8.499,00 TL</div></a></li>
<li class="productListContent-a"><a class="productCardLink-module_a" href="/dji-mini-4-pro-p-HBCV00004X9ZCH"><h2 class="title-module_titleRoot_a"><span>DJI Mini 4 Pro</span></h2><div class="price-module_finalPrice_a">32.999,00 TL</div></a></li>
</ul></body></html>"#;

/// Builds an `HttpRenderer` with a fixed user agent so requests can be matched.
fn test_renderer() -> HttpRenderer {
    HttpRenderer::new(RendererSettings {
        user_agent: Some("pricewatch-test/0.1".to_string()),
        ..RendererSettings::default()
    })
    .expect("failed to build test HttpRenderer")
}

fn no_delay_fetch(max_attempts: u32) -> FetchSettings {
    FetchSettings {
        pre_delay_min: Duration::ZERO,
        pre_delay_max: Duration::ZERO,
        page_timeout: Duration::from_secs(5),
        retry: RetryPolicy::fixed(max_attempts, Duration::ZERO),
        snapshot_dir: None,
    }
}

// ---------------------------------------------------------------------------
// HttpRenderer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn render_returns_body_and_sends_browser_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drones"))
        .and(header("user-agent", "pricewatch-test/0.1"))
        .and(header("accept-language", "tr-TR,tr;q=0.9,en-US;q=0.8,en;q=0.7"))
        .and(header_exists("referer"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
        .expect(1)
        .mount(&server)
        .await;

    let html = test_renderer()
        .render(
            &format!("{}/drones", server.uri()),
            "li",
            Duration::from_secs(5),
        )
        .await
        .expect("render should succeed");

    assert!(html.contains("DJI Neo"));
}

#[tokio::test]
async fn render_maps_429_to_rate_limited_with_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drones"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "17"))
        .mount(&server)
        .await;

    let err = test_renderer()
        .render(
            &format!("{}/drones", server.uri()),
            "li",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

    match err {
        ScraperError::RateLimited {
            retry_after_secs, ..
        } => assert_eq!(retry_after_secs, 17),
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn render_maps_non_success_to_unexpected_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drones"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = test_renderer()
        .render(
            &format!("{}/drones", server.uri()),
            "li",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ScraperError::UnexpectedStatus { status: 503, .. }
    ));
    assert!(err.is_transient());
}

#[tokio::test]
async fn render_times_out_on_slow_server() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drones"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(LISTING)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = test_renderer()
        .render(
            &format!("{}/drones", server.uri()),
            "li",
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ScraperError::Timeout { .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// PageFetcher over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetcher_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drones"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drones"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
        .mount(&server)
        .await;

    let fetcher = PageFetcher::new(Arc::new(test_renderer()), no_delay_fetch(3));
    let url = format!("{}/drones", server.uri());
    let html = fetcher
        .fetch(&PageRequest {
            url: &url,
            wait_selector: r#"li[class^="productListContent-"]"#,
            category: "drones",
            page: 1,
        })
        .await
        .expect("third attempt should succeed");
    assert!(html.contains("DJI Mini 4 Pro"));
}

#[tokio::test]
async fn fetcher_does_not_retry_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = PageFetcher::new(Arc::new(test_renderer()), no_delay_fetch(3));
    let url = format!("{}/gone", server.uri());
    let err = fetcher
        .fetch(&PageRequest {
            url: &url,
            wait_selector: "li",
            category: "drones",
            page: 1,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ScraperError::FetchFailed { attempts: 1, .. }));
}

// ---------------------------------------------------------------------------
// CategoryCrawler over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn crawler_walks_pages_via_query_param() {
    let server = MockServer::start().await;
    let page_two = LISTING
        .replace("2 ürün", "40 ürün")
        .replace("dji-neo-p-HBCV00006Y4HTL", "dji-avata-2-p-HBCV00005OBRYD");

    Mock::given(method("GET"))
        .and(path("/drone-multikopter-c-60006033"))
        .and(query_param("sayfa", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_two))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drone-multikopter-c-60006033"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(LISTING.replace("2 ürün", "40 ürün")),
        )
        .mount(&server)
        .await;

    let shape = PageShape::default();
    let crawler = CategoryCrawler::new(
        PageFetcher::new(Arc::new(test_renderer()), no_delay_fetch(1)),
        Arc::new(SelectorExtractor::new(&shape).unwrap()),
        shape,
        CrawlSettings {
            inter_page_delay: Duration::ZERO,
            category_retry: RetryPolicy::once(),
            max_pages: 10,
        },
    );
    let category = Category {
        slug: "drones".to_string(),
        title: "Drones".to_string(),
        url: format!("{}/drone-multikopter-c-60006033", server.uri()),
        discount_threshold: Decimal::TEN,
        is_active: true,
    };

    let report = crawler
        .crawl(
            &category,
            tokio::time::Instant::now() + Duration::from_secs(60),
        )
        .await
        .expect("crawl should succeed");

    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.items.len(), 4);
    assert!(report.items[2].link.ends_with("/dji-avata-2-p-HBCV00005OBRYD"));
    assert!(report.items[0].link.starts_with(&server.uri()));
}
