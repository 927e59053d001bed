//! Fixtures shared by the cycle and daemon tests.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use pricewatch_core::{Category, NotifyMode, PageShape, RetryPolicy};
use pricewatch_notify::{
    Dispatcher, DispatcherSettings, MemoryDeadLetters, MemoryTransport, MAX_RATE_LIMIT_WAITS,
};
use pricewatch_scraper::{
    CategoryCrawler, CrawlSettings, FetchSettings, PageFetcher, ScriptedRenderer,
    SelectorExtractor, MAX_PAGES,
};
use rust_decimal::Decimal;

pub(crate) const DRONES_URL: &str = "https://shop.example/drone-multikopter-c-60006033";
pub(crate) const CAMERAS_URL: &str = "https://shop.example/aksiyon-kamerasi-c-60001558";

pub(crate) fn category(slug: &str, url: &str) -> Category {
    Category {
        slug: slug.to_string(),
        title: slug.to_string(),
        url: url.to_string(),
        discount_threshold: Decimal::TEN,
        is_active: true,
    }
}

/// A listing page holding `items` as `(code, price)` pairs.
pub(crate) fn listing(items: &[(&str, i64)], total: Option<u32>) -> String {
    let mut html = String::from("<html><body>");
    if let Some(total) = total {
        let _ = write!(
            html,
            r#"<div class="totalProductCount-x"><span>{total} ürün</span></div>"#
        );
    }
    html.push_str("<ul>");
    for (code, price) in items {
        let _ = write!(
            html,
            r#"<li class="productListContent-x"><a class="productCardLink-module_x" href="/urun-{code}-p-{code}"><h2 class="title-module_titleRoot_x"><span>Item {code}</span></h2><div class="price-module_finalPrice_x">{price} TL</div></a></li>"#
        );
    }
    html.push_str("</ul></body></html>");
    html
}

pub(crate) struct Harness {
    pub renderer: Arc<ScriptedRenderer>,
    pub transport: Arc<MemoryTransport>,
    pub dead_letters: Arc<MemoryDeadLetters>,
    pub crawler: CategoryCrawler,
    pub dispatcher: Dispatcher,
}

pub(crate) fn harness(mode: NotifyMode) -> Harness {
    harness_with(mode, ScriptedRenderer::new())
}

pub(crate) fn harness_with(mode: NotifyMode, renderer: ScriptedRenderer) -> Harness {
    let renderer = Arc::new(renderer);
    let fetch = FetchSettings {
        pre_delay_min: Duration::ZERO,
        pre_delay_max: Duration::ZERO,
        page_timeout: Duration::from_secs(30),
        retry: RetryPolicy::fixed(2, Duration::from_secs(1)),
        snapshot_dir: None,
    };
    let shape = PageShape::default();
    let extractor = Arc::new(SelectorExtractor::new(&shape).unwrap());
    let crawler = CategoryCrawler::new(
        PageFetcher::new(renderer.clone(), fetch),
        extractor,
        shape,
        CrawlSettings {
            inter_page_delay: Duration::from_secs(1),
            category_retry: RetryPolicy::fixed(2, Duration::from_secs(1)),
            max_pages: MAX_PAGES,
        },
    );

    let transport = Arc::new(MemoryTransport::new());
    let dead_letters = Arc::new(MemoryDeadLetters::new());
    let dispatcher = Dispatcher::new(
        transport.clone(),
        dead_letters.clone(),
        DispatcherSettings {
            mode,
            buffer_size: 50,
            flush_interval: Duration::from_secs(3600),
            send_delay: Duration::ZERO,
            delivery_retry: RetryPolicy::fixed(3, Duration::from_secs(1)),
            max_rate_limit_waits: MAX_RATE_LIMIT_WAITS,
            dead_letter_max_retries: 3,
        },
    );

    Harness {
        renderer,
        transport,
        dead_letters,
        crawler,
        dispatcher,
    }
}
