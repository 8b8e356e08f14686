//! Data models for pricewatch.

mod link;
mod price;
mod product;

pub use link::{CategoryLink, PageLink};
pub use price::{Price, SENTINEL_PRICE};
pub use product::{PriceChangeEvent, PriceDrop, PriceHistoryEntry, Product, ProductRecord};
