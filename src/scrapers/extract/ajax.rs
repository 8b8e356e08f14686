//! Pages whose product grid is filled in client-side.
//!
//! Nothing here calls the backing search API. The strategy records which
//! loading mechanism the page uses and how many product-like elements the
//! server-rendered HTML already contains, then either hands the page to the
//! embedded-JSON strategy (when the profile configures that fallback) or
//! reports what it found and returns nothing.

use scraper::Selector;
use serde_json::Value;
use tracing::{info, warn};

use super::embedded_json::EmbeddedJsonStrategy;
use super::{ExtractionStrategy, RawFieldMap};
use crate::scrapers::config::AjaxApiConfig;
use crate::scrapers::fetcher::Document;

const ALGOLIA_SIGNATURES: &[&str] = &["algolia", "algoliasearch", "x-algolia"];

pub struct AjaxApiStrategy {
    config: AjaxApiConfig,
    fallback: Option<EmbeddedJsonStrategy>,
}

impl AjaxApiStrategy {
    pub fn new(config: AjaxApiConfig) -> Self {
        let fallback = config.json_fallback().map(EmbeddedJsonStrategy::new);
        Self { config, fallback }
    }

    /// Loading signatures present in the raw page.
    fn detect_signatures(&self, body: &str) -> Vec<String> {
        let lower = body.to_lowercase();
        ALGOLIA_SIGNATURES
            .iter()
            .map(|s| s.to_string())
            .chain(self.config.ajax_indicators.iter().cloned())
            .filter(|sig| !sig.is_empty() && lower.contains(&sig.to_lowercase()))
            .collect()
    }

    /// Index names from `algolia_indices`: an object's keys, a list of names
    /// or a single name.
    fn index_names(&self) -> Vec<String> {
        match &self.config.algolia_indices {
            Value::Object(map) => map.keys().cloned().collect(),
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Value::String(name) if !name.is_empty() => vec![name.clone()],
            _ => Vec::new(),
        }
    }

    fn count_candidates(&self, doc: &Document) -> usize {
        match Selector::parse(&self.config.candidate_selector) {
            Ok(selector) => doc.html().select(&selector).count(),
            Err(_) => 0,
        }
    }
}

impl ExtractionStrategy for AjaxApiStrategy {
    fn extract(&self, doc: &Document) -> Vec<RawFieldMap> {
        let signatures = self.detect_signatures(&doc.body);
        let candidates = self.count_candidates(doc);

        if let Some(fallback) = &self.fallback {
            info!(
                "{} loads products client-side ({}), trying embedded JSON fallback",
                doc.url,
                if signatures.is_empty() { "no known signature".to_string() } else { signatures.join(", ") }
            );
            let records = fallback.extract(doc);
            if !records.is_empty() {
                return records;
            }
        }

        warn!(
            url = %doc.url,
            api_type = %self.config.api_type,
            signatures = ?signatures,
            candidate_elements = candidates,
            indices = ?self.index_names(),
            products_in_initial_load = self.config.products_in_initial_load,
            note = self.config.note.as_deref().unwrap_or(""),
            "Products are loaded by client-side API calls; no records extracted"
        );
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "ajax_api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::fetcher::DocumentFormat;
    use serde_json::json;

    const PAGE: &str = r#"<html><head><script src="https://cdn.example/algoliasearch.min.js"></script></head>
        <body><div class="product" data-product-id="1"></div>
        <script>var STATE = [{"sku":"Z9","price":15}];</script></body></html>"#;

    fn doc() -> Document {
        Document::new("https://shop.example/c/all", DocumentFormat::Html, PAGE)
    }

    #[test]
    fn test_index_names() {
        let with = |indices: Value| {
            AjaxApiStrategy::new(
                serde_json::from_value(json!({"api_type": "algolia", "algolia_indices": indices}))
                    .unwrap(),
            )
            .index_names()
        };
        assert_eq!(
            with(json!({"products": "shopify_products", "collections": "shopify_collections"})),
            vec!["collections".to_string(), "products".to_string()]
        );
        assert_eq!(with(json!(["main", 3])), vec!["main".to_string()]);
        assert_eq!(with(json!("main")), vec!["main".to_string()]);
        assert!(with(Value::Null).is_empty());
    }

    #[test]
    fn test_stub_reports_and_returns_nothing() {
        let s = AjaxApiStrategy::new(
            serde_json::from_value(json!({"api_type": "algolia", "ajax_indicators": ["STATE"]}))
                .unwrap(),
        );
        assert_eq!(
            s.detect_signatures(PAGE),
            vec!["algolia".to_string(), "algoliasearch".to_string(), "STATE".to_string()]
        );
        assert_eq!(s.count_candidates(&doc()), 1);
        assert!(s.extract(&doc()).is_empty());
    }

    #[test]
    fn test_delegates_to_embedded_json() {
        let s = AjaxApiStrategy::new(
            serde_json::from_value(json!({
                "api_type": "algolia",
                "fallback_method": "json_script_tag",
                "patterns": [{"start": "var STATE = ", "end": ";</script>"}],
                "product_path": [],
                "fields": {"id": ["sku"], "price": ["price"]}
            }))
            .unwrap(),
        );
        let records = s.extract(&doc());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], json!("Z9"));
    }
}
