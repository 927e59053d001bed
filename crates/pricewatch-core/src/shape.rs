use serde::{Deserialize, Serialize};

/// Selectors and paging conventions describing one listing-page layout.
///
/// A site layout change is handled by editing this descriptor (the
/// `page_shape` block of the categories file), not by a new code path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageShape {
    /// One element per product card.
    pub item_selector: String,
    pub title_selector: String,
    pub price_selector: String,
    pub link_selector: String,
    /// Element whose text holds the category's total item count.
    pub total_count_selector: String,
    /// Marker that must be present before a page counts as loaded.
    pub ready_selector: String,
    /// Query parameter carrying the page number.
    pub page_param: String,
    pub page_size: u32,
}

impl Default for PageShape {
    fn default() -> Self {
        Self {
            item_selector: r#"li[class^="productListContent-"]"#.to_string(),
            title_selector: r#"h2[class^="title-module_titleRoot"] span"#.to_string(),
            price_selector: r#"div[class^="price-module_finalPrice"]"#.to_string(),
            link_selector: r#"a[class^="productCardLink-module"]"#.to_string(),
            total_count_selector: r#"div[class^="totalProductCount-"] span"#.to_string(),
            ready_selector: r#"li[class^="productListContent-"]"#.to_string(),
            page_param: "sayfa".to_string(),
            page_size: 36,
        }
    }
}

impl PageShape {
    /// Number of pages needed for `total` items, at least one.
    #[must_use]
    pub fn page_count(&self, total: u32) -> u32 {
        let size = self.page_size.max(1);
        total.div_ceil(size).max(1)
    }
}
