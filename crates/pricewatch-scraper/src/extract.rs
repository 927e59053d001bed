//! Listing extraction strategy.
//!
//! DOM selectors are the most fragile part of the pipeline, so extraction
//! sits behind [`ListingExtractor`]. The default [`SelectorExtractor`] is
//! driven entirely by a [`PageShape`].

use pricewatch_core::{PageShape, RawItem};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::error::ScraperError;
use crate::link::clean_link;

/// Pulls product cards and the total item count out of one listing page.
pub trait ListingExtractor: Send + Sync {
    /// Items in document order. `page_url` resolves relative links.
    fn extract_items(&self, html: &str, page_url: &Url) -> Vec<RawItem>;

    /// Total items the category reports, if the page shows it.
    fn total_count(&self, html: &str) -> Option<u32>;
}

fn compile(selector: &str) -> Result<Selector, ScraperError> {
    Selector::parse(selector).map_err(|e| ScraperError::InvalidSelector {
        selector: selector.to_owned(),
        reason: e.to_string(),
    })
}

/// Whether `html` contains at least one element matching `selector`.
///
/// # Errors
///
/// Returns [`ScraperError::InvalidSelector`] if `selector` does not parse.
pub fn contains_selector(html: &str, selector: &str) -> Result<bool, ScraperError> {
    let selector = compile(selector)?;
    let document = Html::parse_document(html);
    Ok(document.select(&selector).next().is_some())
}

/// [`ListingExtractor`] backed by CSS selectors from a [`PageShape`].
#[derive(Debug)]
pub struct SelectorExtractor {
    item: Selector,
    title: Selector,
    price: Selector,
    link: Selector,
    any_link: Selector,
    img: Selector,
    source: Selector,
    data_src: Selector,
    total: Selector,
}

impl SelectorExtractor {
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidSelector`] for the first selector of the
    /// shape that does not parse.
    pub fn new(shape: &PageShape) -> Result<Self, ScraperError> {
        Ok(Self {
            item: compile(&shape.item_selector)?,
            title: compile(&shape.title_selector)?,
            price: compile(&shape.price_selector)?,
            link: compile(&shape.link_selector)?,
            any_link: compile("a[href]")?,
            img: compile("img[src]")?,
            source: compile("source[srcset]")?,
            data_src: compile("[data-src]")?,
            total: compile(&shape.total_count_selector)?,
        })
    }

    fn card_link(&self, card: ElementRef<'_>) -> Option<String> {
        card.select(&self.link)
            .chain(card.select(&self.any_link))
            .find_map(|a| a.value().attr("href"))
            .map(str::to_owned)
    }

    fn card_title(&self, card: ElementRef<'_>) -> String {
        let title = card
            .select(&self.title)
            .next()
            .map(element_text)
            .unwrap_or_default();
        if !title.is_empty() {
            return title;
        }
        card.select(&self.link)
            .next()
            .and_then(|a| a.value().attr("title"))
            .map(|t| t.trim().to_owned())
            .unwrap_or_default()
    }

    /// First `img[src]`, else the first candidate of a `source[srcset]`,
    /// else a lazy-loading `[data-src]`.
    fn card_image(&self, card: ElementRef<'_>) -> Option<String> {
        let from_img = card
            .select(&self.img)
            .filter_map(|img| img.value().attr("src"))
            .map(str::trim)
            .find(|src| !src.is_empty() && !src.starts_with("data:"));
        if let Some(src) = from_img {
            return Some(src.to_owned());
        }

        let from_srcset = card
            .select(&self.source)
            .filter_map(|s| s.value().attr("srcset"))
            .find_map(|srcset| {
                srcset
                    .split(',')
                    .next()
                    .and_then(|candidate| candidate.split_whitespace().next())
                    .filter(|u| !u.is_empty())
            });
        if let Some(src) = from_srcset {
            return Some(src.to_owned());
        }

        card.select(&self.data_src)
            .filter_map(|e| e.value().attr("data-src"))
            .map(str::trim)
            .find(|src| !src.is_empty())
            .map(str::to_owned)
    }
}

impl ListingExtractor for SelectorExtractor {
    fn extract_items(&self, html: &str, page_url: &Url) -> Vec<RawItem> {
        let document = Html::parse_document(html);
        let mut items = Vec::new();

        for card in document.select(&self.item) {
            let Some(href) = self.card_link(card) else {
                tracing::debug!(page = %page_url, "skipping card without a link");
                continue;
            };
            let Some(link) = clean_link(&href, page_url) else {
                tracing::debug!(page = %page_url, href, "skipping card with unusable link");
                continue;
            };

            let price_text = card
                .select(&self.price)
                .next()
                .map(element_text)
                .unwrap_or_default();

            items.push(RawItem {
                title: self.card_title(card),
                price_text,
                link,
                image: self.card_image(card),
            });
        }

        items
    }

    fn total_count(&self, html: &str) -> Option<u32> {
        let document = Html::parse_document(html);
        let text = document.select(&self.total).next().map(element_text)?;
        let digits: String = text.chars().filter(char::is_ascii_digit).collect();
        digits.parse().ok()
    }
}

/// Element text with runs of whitespace collapsed.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
