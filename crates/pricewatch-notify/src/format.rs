//! Chat message formatting for change events.

use pricewatch_core::{ChangeEvent, ChangeKind};

use crate::transport::OutgoingMessage;

/// Formats `event` as an HTML chat message with the product image attached.
#[must_use]
pub fn format_event(event: &ChangeEvent) -> OutgoingMessage {
    let product = &event.product;
    let title = escape_html(&product.title);
    let link = escape_html(&product.link);
    let category = escape_html(&event.category_slug);

    let text = match event.kind {
        ChangeKind::New => format!(
            "🆕 <b>New product</b>\n{title}\n\n💰 {price}\n🏷 {category}\n\n<a href=\"{link}\">View product</a>",
            price = format_price(product.price),
        ),
        ChangeKind::PriceDrop => {
            let previous = event
                .previous_price
                .map_or_else(|| "?".to_string(), format_price);
            let percent = event
                .percent_change
                .map_or_else(|| "?".to_string(), |p| p.round_dp(2).normalize().to_string());
            format!(
                "📉 <b>Price drop: %{percent}</b>\n{title}\n\n❌ {previous}\n✅ {price}\n🏷 {category}\n\n<a href=\"{link}\">View product</a>",
                price = format_price(product.price),
            )
        }
    };

    OutgoingMessage {
        text,
        image_url: product.image.clone(),
    }
}

/// `1234567` becomes `1.234.567 TL`.
#[must_use]
pub fn format_price(price: i64) -> String {
    let digits = price.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let sign = if price < 0 { "-" } else { "" };
    format!("{sign}{grouped} TL")
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
