use std::fmt::Write as _;

use rust_decimal::Decimal;

use super::*;
use crate::extract::SelectorExtractor;
use crate::fetcher::FetchSettings;
use crate::scripted::ScriptedRenderer;

const CATEGORY_URL: &str = "https://shop.example/drone-multikopter-c-60006033";

fn category() -> Category {
    Category {
        slug: "drones".to_string(),
        title: "Drones".to_string(),
        url: CATEGORY_URL.to_string(),
        discount_threshold: Decimal::TEN,
        is_active: true,
    }
}

fn page(n: u32) -> String {
    if n == 1 {
        CATEGORY_URL.to_string()
    } else {
        format!("{CATEGORY_URL}?sayfa={n}")
    }
}

/// A listing page with `count` cards numbered from `first`.
fn listing(first: u32, count: u32, total: Option<u32>) -> String {
    let mut html = String::from("<html><body>");
    if let Some(total) = total {
        let _ = write!(
            html,
            r#"<div class="totalProductCount-x"><span>{total} ürün</span></div>"#
        );
    }
    html.push_str("<ul>");
    for i in first..first + count {
        let _ = write!(
            html,
            r#"<li class="productListContent-x"><a class="productCardLink-module_x" href="/drone-{i}-p-HBCV{i:08}"><h2 class="title-module_titleRoot_x"><span>Drone {i}</span></h2><div class="price-module_finalPrice_x">{price} TL</div></a></li>"#,
            price = 1000 + i
        );
    }
    html.push_str("</ul></body></html>");
    html
}

fn crawler(renderer: Arc<ScriptedRenderer>, settings: CrawlSettings) -> CategoryCrawler {
    let fetch = FetchSettings {
        pre_delay_min: Duration::ZERO,
        pre_delay_max: Duration::ZERO,
        page_timeout: Duration::from_secs(30),
        retry: RetryPolicy::fixed(3, Duration::from_secs(5)),
        snapshot_dir: None,
    };
    let shape = PageShape::default();
    let extractor = Arc::new(SelectorExtractor::new(&shape).unwrap());
    CategoryCrawler::new(PageFetcher::new(renderer, fetch), extractor, shape, settings)
}

fn settings() -> CrawlSettings {
    CrawlSettings {
        inter_page_delay: Duration::from_secs(2),
        category_retry: RetryPolicy::fixed(3, Duration::from_secs(5)),
        max_pages: MAX_PAGES,
    }
}

fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(3600)
}

#[tokio::test(start_paused = true)]
async fn crawls_every_page_in_order() {
    let renderer = Arc::new(ScriptedRenderer::new());
    renderer.set_page(page(1), listing(1, 36, Some(80)));
    renderer.set_page(page(2), listing(37, 36, Some(80)));
    renderer.set_page(page(3), listing(73, 8, Some(80)));

    let report = crawler(renderer.clone(), settings())
        .crawl(&category(), far_deadline())
        .await
        .unwrap();

    assert_eq!(renderer.calls(), vec![page(1), page(2), page(3)]);
    assert_eq!(report.items.len(), 80);
    assert_eq!(report.items[0].title, "Drone 1");
    assert_eq!(report.items[79].title, "Drone 80");
    assert_eq!(report.total_reported, Some(80));
    assert_eq!(report.pages_planned, 3);
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.attempts, 1);
    assert!(report.complete);
}

#[tokio::test(start_paused = true)]
async fn waits_between_pages() {
    let renderer = Arc::new(ScriptedRenderer::new());
    renderer.set_page(page(1), listing(1, 36, Some(100)));
    renderer.set_page(page(2), listing(37, 36, Some(100)));
    renderer.set_page(page(3), listing(73, 28, Some(100)));

    let started = Instant::now();
    crawler(renderer, settings())
        .crawl(&category(), far_deadline())
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn missing_total_crawls_first_page_only() {
    let renderer = Arc::new(ScriptedRenderer::new());
    renderer.set_page(page(1), listing(1, 5, None));

    let report = crawler(renderer.clone(), settings())
        .crawl(&category(), far_deadline())
        .await
        .unwrap();

    assert_eq!(renderer.calls().len(), 1);
    assert_eq!(report.items.len(), 5);
    assert_eq!(report.pages_planned, 1);
    assert!(report.complete, "a short first page covers the listing");
}

#[tokio::test(start_paused = true)]
async fn missing_total_with_full_first_page_is_incomplete() {
    let renderer = Arc::new(ScriptedRenderer::new());
    renderer.set_page(page(1), listing(1, 36, None));

    let report = crawler(renderer, settings())
        .crawl(&category(), far_deadline())
        .await
        .unwrap();
    assert!(!report.complete);
}

#[tokio::test(start_paused = true)]
async fn page_failure_retries_whole_category() {
    let renderer = Arc::new(ScriptedRenderer::new());
    renderer.set_page(page(1), listing(1, 36, Some(50)));
    renderer.set_page(page(2), listing(37, 14, Some(50)));
    renderer.fail_next(page(2), 3);

    let report = crawler(renderer.clone(), settings())
        .crawl(&category(), far_deadline())
        .await
        .unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.items.len(), 50, "first attempt's items are discarded");
    assert_eq!(
        renderer.calls(),
        vec![page(1), page(2), page(2), page(2), page(1), page(2)]
    );
}

#[tokio::test(start_paused = true)]
async fn category_fails_after_exhausting_attempts() {
    let renderer = Arc::new(ScriptedRenderer::new());
    renderer.set_page(page(1), listing(1, 3, Some(3)));
    renderer.fail_next(page(1), 100);

    let err = crawler(renderer.clone(), settings())
        .crawl(&category(), far_deadline())
        .await
        .unwrap_err();

    assert!(matches!(err, ScraperError::FetchFailed { attempts: 3, .. }));
    assert_eq!(renderer.calls().len(), 9, "3 category attempts x 3 page attempts");
}

#[tokio::test(start_paused = true)]
async fn first_page_shape_mismatch_fails_without_retry() {
    let renderer = Arc::new(ScriptedRenderer::new());
    renderer.set_page(page(1), "<html><body>Erişim engellendi</body></html>");

    let err = crawler(renderer.clone(), settings())
        .crawl(&category(), far_deadline())
        .await
        .unwrap_err();

    assert!(matches!(err, ScraperError::UnexpectedPageShape { .. }));
    assert_eq!(renderer.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn later_page_shape_mismatch_is_skipped() {
    let renderer = Arc::new(ScriptedRenderer::new());
    renderer.set_page(page(1), listing(1, 36, Some(80)));
    renderer.set_page(page(2), "<html><body>empty</body></html>");
    renderer.set_page(page(3), listing(73, 8, Some(80)));

    let report = crawler(renderer, settings())
        .crawl(&category(), far_deadline())
        .await
        .unwrap();

    assert_eq!(report.items.len(), 44);
    assert_eq!(report.skipped_pages, vec![2]);
    assert_eq!(report.pages_fetched, 2);
    assert!(!report.complete);
}

#[tokio::test(start_paused = true)]
async fn page_count_is_capped() {
    let renderer = Arc::new(ScriptedRenderer::new());
    renderer.set_page(page(1), listing(1, 36, Some(100_000)));
    renderer.set_page(page(2), listing(37, 36, Some(100_000)));
    let mut settings = settings();
    settings.max_pages = 2;

    let report = crawler(renderer.clone(), settings)
        .crawl(&category(), far_deadline())
        .await
        .unwrap();

    assert_eq!(renderer.calls().len(), 2);
    assert_eq!(report.pages_planned, 2);
    assert!(!report.complete);
}

#[tokio::test(start_paused = true)]
async fn expired_budget_starts_nothing() {
    let renderer = Arc::new(ScriptedRenderer::new());
    renderer.set_page(page(1), listing(1, 3, Some(3)));

    let err = crawler(renderer.clone(), settings())
        .crawl(&category(), Instant::now())
        .await
        .unwrap_err();

    assert!(matches!(err, ScraperError::BudgetExceeded { .. }));
    assert!(renderer.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn budget_aborts_mid_page() {
    let renderer = Arc::new(ScriptedRenderer::new().with_latency(Duration::from_secs(20)));
    renderer.set_page(page(1), listing(1, 36, Some(72)));
    renderer.set_page(page(2), listing(37, 36, Some(72)));

    let deadline = Instant::now() + Duration::from_secs(30);
    let err = crawler(renderer.clone(), settings())
        .crawl(&category(), deadline)
        .await
        .unwrap_err();

    assert!(matches!(err, ScraperError::BudgetExceeded { .. }));
    assert_eq!(renderer.calls(), vec![page(1)], "page 2 render was cut off");
}

#[tokio::test]
async fn invalid_category_url_is_reported() {
    let renderer = Arc::new(ScriptedRenderer::new());
    let mut category = category();
    category.url = "mailto:someone@example.com".to_string();

    let err = crawler(renderer, settings())
        .crawl(&category, far_deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, ScraperError::InvalidCategoryUrl { .. }));
}
