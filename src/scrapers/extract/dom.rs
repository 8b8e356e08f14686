//! Extract products with CSS selectors.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::{ExtractionStrategy, RawFieldMap};
use crate::scrapers::config::{DomConfig, SelectorField, SELF_SELECTOR};
use crate::scrapers::fetcher::Document;

pub struct DomStrategy {
    config: DomConfig,
}

impl DomStrategy {
    pub fn new(config: DomConfig) -> Self {
        Self { config }
    }
}

/// Product detail pages look like `https://shop/products/<handle>`.
fn is_single_product_url(url: &str) -> bool {
    url.contains("/products/") && url.split('/').filter(|s| !s.is_empty()).count() >= 3
}

/// Text content with runs of whitespace collapsed. Adjacent text nodes are
/// concatenated as-is, so `£<span>58</span>.<span>50</span>` reads `£58.50`.
fn element_text(element: ElementRef<'_>) -> String {
    let text: String = element.text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn in_badge(element: ElementRef<'_>) -> bool {
    element.ancestors().filter_map(ElementRef::wrap).any(|parent| {
        let el = parent.value();
        el.name().contains("badge") || el.classes().any(|c| c.contains("badge"))
    })
}

fn read_field(element: ElementRef<'_>, field: &SelectorField) -> Option<String> {
    let value = if field.attribute == "text" {
        element_text(element)
    } else {
        element.value().attr(&field.attribute)?.trim().to_string()
    };
    if value.is_empty() {
        return None;
    }
    match field.prefix.as_deref() {
        Some(prefix) if !prefix.is_empty() => Some(format!("{prefix}{value}")),
        _ => Some(value),
    }
}

/// Locate the element a field reads from within `scope`.
fn locate<'a>(scope: ElementRef<'a>, name: &str, field: &SelectorField) -> Option<ElementRef<'a>> {
    if field.selector == SELF_SELECTOR {
        return Some(scope);
    }
    let selector = Selector::parse(&field.selector).ok()?;
    if name == "price" && field.selector.contains(".money") {
        return scope.select(&selector).find(|el| !in_badge(*el));
    }
    scope.select(&selector).next()
}

fn map_fields(scope: ElementRef<'_>, fields: &BTreeMap<String, SelectorField>) -> RawFieldMap {
    fields
        .iter()
        .filter_map(|(name, field)| {
            let element = locate(scope, name, field)?;
            let value = read_field(element, field)?;
            Some((name.clone(), Value::String(value)))
        })
        .collect()
}

impl DomStrategy {
    fn extract_single(&self, html: &Html, page_url: &str, fields: &BTreeMap<String, SelectorField>) -> Vec<RawFieldMap> {
        let mut record = map_fields(html.root_element(), fields);
        if record.is_empty() {
            return Vec::new();
        }
        record
            .entry("id".to_string())
            .or_insert_with(|| Value::String(page_url.to_string()));
        record
            .entry("url".to_string())
            .or_insert_with(|| Value::String(page_url.to_string()));
        vec![record]
    }
}

impl ExtractionStrategy for DomStrategy {
    fn extract(&self, doc: &Document) -> Vec<RawFieldMap> {
        let html = doc.html();
        let Ok(container) = Selector::parse(&self.config.product_selector) else {
            return Vec::new();
        };
        let containers: Vec<ElementRef<'_>> = html.select(&container).collect();

        if let Some(single) = &self.config.single_product_fields {
            let single_page = is_single_product_url(&doc.url);
            if single_page || containers.is_empty() {
                debug!(
                    "{} on {}, treating as a single product page",
                    if single_page { "Product URL" } else { "No product containers" },
                    doc.url
                );
                return self.extract_single(&html, &doc.url, single);
            }
        }

        if containers.is_empty() {
            debug!("No elements match {:?} on {}", self.config.product_selector, doc.url);
        }

        containers
            .into_iter()
            .map(|el| map_fields(el, &self.config.fields))
            .filter(|record| !record.is_empty())
            .collect()
    }

    fn name(&self) -> &'static str {
        "dom_scraping"
    }
}
