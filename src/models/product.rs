//! Product models: canonical records, persisted snapshots and price history.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Price;

/// A validated product observation ready for reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    pub price: Price,
    pub url: String,
    pub site: String,
}

/// Current stored snapshot of a product, keyed by `(id, site)`.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: String,
    pub site: String,
    pub name: String,
    pub url: String,
    pub price: Price,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only price observation.
#[derive(Debug, Clone, Serialize)]
pub struct PriceHistoryEntry {
    pub product_id: String,
    pub site: String,
    pub price: Price,
    pub recorded_at: DateTime<Utc>,
}

/// Emitted when an observed price falls at least the alert threshold below
/// the stored price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceChangeEvent {
    pub product_id: String,
    pub product_name: String,
    pub site_name: String,
    pub product_url: String,
    pub old_price: Price,
    pub new_price: Price,
    pub percent_decrease: f64,
}

impl PriceChangeEvent {
    pub fn new(stored: &Product, observed: &ProductRecord) -> Self {
        Self {
            product_id: observed.id.clone(),
            product_name: observed.name.clone(),
            site_name: observed.site.clone(),
            product_url: observed.url.clone(),
            old_price: stored.price,
            new_price: observed.price,
            percent_decrease: observed.price.percent_below(stored.price),
        }
    }

    /// Short subject line for mail or chat notifications.
    pub fn subject(&self, currency: &str) -> String {
        format!(
            "{} is now {}{}",
            self.product_name,
            currency,
            self.new_price.short()
        )
    }

    /// Plain-text notification body.
    pub fn message(&self, currency: &str) -> String {
        format!(
            "{site}: {c}{new}. Price for '{name}' has dropped {pct:.1}%! Old price: {c}{old}, New price: {c}{new}, URL: {url}",
            site = self.site_name,
            c = currency,
            new = self.new_price.short(),
            old = self.old_price.short(),
            name = self.product_name,
            pct = self.percent_decrease,
            url = self.product_url,
        )
    }
}

/// A recorded drop between two consecutive history entries.
#[derive(Debug, Clone, Serialize)]
pub struct PriceDrop {
    pub product_id: String,
    pub site: String,
    pub name: String,
    pub url: String,
    pub old_price: Price,
    pub new_price: Price,
    pub percent_decrease: f64,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(price: i64) -> Product {
        let now = Utc::now();
        Product {
            id: "sku-1".to_string(),
            site: "shop".to_string(),
            name: "Old name".to_string(),
            url: "https://shop.example/p/1".to_string(),
            price: Price::from_minor(price),
            first_seen_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_change_event_percent() {
        let observed = ProductRecord {
            id: "sku-1".to_string(),
            name: "Widget".to_string(),
            price: Price::from_minor(4900),
            url: "https://shop.example/p/1".to_string(),
            site: "shop".to_string(),
        };
        let event = PriceChangeEvent::new(&stored(10_000), &observed);
        assert_eq!(event.percent_decrease, 51.0);
        assert_eq!(event.product_name, "Widget");
        assert_eq!(event.subject("£"), "Widget is now £49");
        assert!(event
            .message("£")
            .starts_with("shop: £49. Price for 'Widget' has dropped 51.0%! Old price: £100"));
    }
}
