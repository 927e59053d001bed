pub mod crawler;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod link;
pub mod renderer;
pub mod scripted;
pub mod snapshot;

pub use crawler::{CategoryCrawler, CrawlReport, CrawlSettings, CrawlState, MAX_PAGES};
pub use error::ScraperError;
pub use extract::{contains_selector, ListingExtractor, SelectorExtractor};
pub use fetcher::{FetchSettings, PageFetcher, PageRequest};
pub use link::{clean_link, page_url};
pub use renderer::{extract_origin, HttpRenderer, PageRenderer, RendererSettings};
pub use scripted::ScriptedRenderer;
