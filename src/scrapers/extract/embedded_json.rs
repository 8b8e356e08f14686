//! Extract products from JSON embedded in page source.
//!
//! Shops built on client-side frameworks usually ship their catalogue state
//! inline (`window.__STATE__ = {...};`). The strategy slices that blob out
//! between configured markers, walks `product_path` down to the product
//! list and maps each entry through the configured field paths.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::path::{resolve, step};
use super::price::apply_pence_heuristic;
use super::{value_to_string, ExtractionStrategy, RawFieldMap};
use crate::scrapers::config::{EmbeddedJsonConfig, FieldPath, FieldSource, JsonFallback, MarkerPair};
use crate::scrapers::fetcher::Document;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(\w+)\}").unwrap());

const URL_TEMPLATE: &str = "url_template";

pub struct EmbeddedJsonStrategy {
    config: EmbeddedJsonConfig,
}

impl EmbeddedJsonStrategy {
    pub fn new(config: EmbeddedJsonConfig) -> Self {
        Self { config }
    }

    /// Decode the first marker pair that yields valid JSON.
    fn decode_markers(&self, text: &str) -> Option<Value> {
        self.config
            .patterns
            .iter()
            .find_map(|pair| match slice_between(text, pair) {
                Some(slice) => match serde_json::from_str(slice) {
                    Ok(value) => {
                        debug!("Decoded embedded JSON using marker {:?}", truncate(&pair.start, 20));
                        Some(value)
                    }
                    Err(e) => {
                        debug!("Marker {:?} matched but JSON did not parse: {}", truncate(&pair.start, 20), e);
                        None
                    }
                },
                None => None,
            })
    }
}

impl ExtractionStrategy for EmbeddedJsonStrategy {
    fn extract(&self, doc: &Document) -> Vec<RawFieldMap> {
        if let Some(data) = self.decode_markers(&doc.body) {
            return map_products(&data, &self.config.product_path, &self.config.fields, &doc.url);
        }

        if !self.config.fallback_patterns.is_empty() {
            debug!("No marker pair decoded on {}, trying fallbacks", doc.url);
            let html = doc.html();
            for fallback in &self.config.fallback_patterns {
                let JsonFallback::JsonApplicationScript {
                    selector,
                    product_path,
                    fields,
                } = fallback;
                let Ok(sel) = Selector::parse(selector) else {
                    continue;
                };
                let decoded = html.select(&sel).find_map(|script| {
                    let text: String = script.text().collect();
                    serde_json::from_str::<Value>(text.trim()).ok()
                });
                if let Some(data) = decoded {
                    debug!("Decoded JSON from fallback script {:?}", selector);
                    return map_products(&data, product_path, fields, &doc.url);
                }
            }
        }

        warn!(
            "No embedded JSON found on {} ({} marker pair(s), {} fallback(s) tried)",
            doc.url,
            self.config.patterns.len(),
            self.config.fallback_patterns.len()
        );
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "json_script_tag"
    }
}

/// The text between `start` and the first `end` that follows it.
fn slice_between<'a>(text: &'a str, pair: &MarkerPair) -> Option<&'a str> {
    let from = text.find(&pair.start)? + pair.start.len();
    let len = text[from..].find(&pair.end)?;
    Some(&text[from..from + len])
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

fn describe_keys(node: &Value) -> String {
    match node {
        Value::Object(map) => map.keys().cloned().collect::<Vec<_>>().join(", "),
        Value::Array(items) => format!("<array of {}>", items.len()),
        other => format!("<{}>", type_name(other)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Walk `product_path` and map each product found there.
fn map_products(
    data: &Value,
    product_path: &FieldPath,
    fields: &BTreeMap<String, FieldSource>,
    page_url: &str,
) -> Vec<RawFieldMap> {
    let mut node = data;
    for (depth, key) in product_path.keys().iter().enumerate() {
        match step(node, key) {
            Some(next) => node = next,
            None => {
                warn!(
                    "Key {:?} not found at depth {} of product path on {}; available: [{}]",
                    key,
                    depth,
                    page_url,
                    describe_keys(node)
                );
                return Vec::new();
            }
        }
    }

    let items: Vec<&Value> = match node {
        Value::Array(items) if !items.is_empty() => items.iter().collect(),
        Value::Object(map) if !map.is_empty() => vec![node],
        _ => {
            warn!(
                "No products at path {:?} on {} (found {})",
                product_path.keys(),
                page_url,
                type_name(node)
            );
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| map_product(item, fields, page_url))
        .collect()
}

fn map_product(
    item: &Value,
    fields: &BTreeMap<String, FieldSource>,
    page_url: &str,
) -> Option<RawFieldMap> {
    let mut record = RawFieldMap::new();

    for (name, source) in fields {
        if name == URL_TEMPLATE {
            continue;
        }
        let FieldSource::Path(path) = source else {
            debug!("Field {} is not a path, ignoring", name);
            continue;
        };
        match resolve(item, path.keys()) {
            Some(Value::Null) | None => {}
            Some(value) => {
                record.insert(name.clone(), value.clone());
            }
        }
    }

    if let Some(price) = record.get("price").and_then(apply_pence_heuristic) {
        record.insert("price".to_string(), price);
    }

    if let Some(FieldSource::Template(template)) = fields.get(URL_TEMPLATE) {
        match expand_template(template, &record) {
            Some(url) => {
                record.insert("url".to_string(), Value::String(url));
            }
            None => {
                debug!("Skipping product: url_template {:?} has unresolved fields", template);
                return None;
            }
        }
    }

    let has_url = record
        .get("url")
        .and_then(value_to_string)
        .is_some_and(|u| !u.is_empty());
    if !has_url {
        let url = fallback_url(record.get("id").and_then(value_to_string), page_url);
        record.insert("url".to_string(), Value::String(url));
    }

    Some(record)
}

/// Substitute `{field}` placeholders from resolved fields.
fn expand_template(template: &str, record: &RawFieldMap) -> Option<String> {
    let mut missing = false;
    let expanded = PLACEHOLDER.replace_all(template, |caps: &regex::Captures| {
        match record.get(&caps[1]).and_then(value_to_string) {
            Some(value) => value,
            None => {
                missing = true;
                String::new()
            }
        }
    });
    (!missing).then(|| expanded.into_owned())
}

/// A site search for the product id, or the listing page itself.
fn fallback_url(id: Option<String>, page_url: &str) -> String {
    let Some(id) = id.filter(|id| !id.is_empty()) else {
        return page_url.to_string();
    };
    match Url::parse(page_url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => {
                let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();
                format!(
                    "{}://{}{}/search?q={}",
                    parsed.scheme(),
                    host,
                    port,
                    urlencoding::encode(&id)
                )
            }
            None => page_url.to_string(),
        },
        Err(_) => page_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::fetcher::DocumentFormat;
    use serde_json::json;

    fn strategy(config: Value) -> EmbeddedJsonStrategy {
        EmbeddedJsonStrategy::new(serde_json::from_value(config).unwrap())
    }

    fn page(body: &str) -> Document {
        Document::new("https://shop.example/c/blankets", DocumentFormat::Html, body)
    }

    #[test]
    fn test_markers_and_product_path() {
        let s = strategy(json!({
            "patterns": [{"start": "window.__DATA__ = ", "end": ";</script>"}],
            "product_path": ["catalog", "products"],
            "fields": {
                "id": ["sku"],
                "name": ["title"],
                "price": ["price", "current"],
                "url_template": "https://shop.example/p/{id}"
            }
        }));
        let body = r#"<html><script>window.__DATA__ = {"catalog":{"products":[
            {"sku":"A1","title":"Wool Blanket","price":{"current":12999}},
            {"sku":"B2","title":"Throw","price":{"current":45.5}}
        ]}};</script></html>"#;

        let records = s.extract(&page(body));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], json!("A1"));
        assert_eq!(records[0]["price"], json!(129.99));
        assert_eq!(records[0]["url"], json!("https://shop.example/p/A1"));
        assert_eq!(records[1]["price"], json!(45.5));
    }

    #[test]
    fn test_bad_first_pair_advances_to_next() {
        let s = strategy(json!({
            "patterns": [
                {"start": "var broken = ", "end": ";"},
                {"start": "var good = ", "end": ";//end"}
            ],
            "product_path": [],
            "fields": {"id": ["id"], "price": ["price"]}
        }));
        let body = r#"var broken = {not json; var good = [{"id": 7, "price": "1299"}];//end"#;

        let records = s.extract(&page(body));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], json!(7));
        assert_eq!(records[0]["price"], json!(12.99));
        assert_eq!(records[0]["url"], json!("https://shop.example/search?q=7"));
    }

    #[test]
    fn test_application_json_fallback() {
        let s = strategy(json!({
            "patterns": [{"start": "nope", "end": "nope"}],
            "product_path": ["unused"],
            "fields": {},
            "fallback_patterns": [{
                "method": "json_application_script",
                "product_path": ["items"],
                "fields": {"id": ["handle"], "price": ["price"]}
            }]
        }));
        let body = r#"<script type="application/json">{"items":[{"handle":"scarf","price":20}]}</script>"#;

        let records = s.extract(&page(body));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], json!("scarf"));
        assert_eq!(records[0]["price"], json!(20));
    }

    #[test]
    fn test_missing_path_key_yields_nothing() {
        let s = strategy(json!({
            "patterns": [{"start": "<x>", "end": "</x>"}],
            "product_path": ["catalog", "missing"],
            "fields": {"id": ["sku"]}
        }));
        assert!(s.extract(&page(r#"<x>{"catalog":{"items":[]}}</x>"#)).is_empty());
        assert!(s.extract(&page("no markers here")).is_empty());
    }

    #[test]
    fn test_unresolved_template_skips_record() {
        let s = strategy(json!({
            "patterns": [{"start": "<x>", "end": "</x>"}],
            "product_path": [],
            "fields": {"id": ["sku"], "url_template": "/p/{slug}"}
        }));
        assert!(s.extract(&page(r#"<x>[{"sku":"A"}]</x>"#)).is_empty());
    }

    #[test]
    fn test_url_falls_back_to_page_without_id() {
        let s = strategy(json!({
            "patterns": [{"start": "<x>", "end": "</x>"}],
            "product_path": [],
            "fields": {"name": ["n"]}
        }));
        let records = s.extract(&page(r#"<x>[{"n":"Hat"}]</x>"#));
        assert_eq!(records[0]["url"], json!("https://shop.example/c/blankets"));
    }

    #[test]
    fn test_slice_uses_end_after_start() {
        let pair = MarkerPair {
            start: "START".to_string(),
            end: "END".to_string(),
        };
        assert_eq!(slice_between("END START[1]END", &pair), Some("[1]"));
        assert_eq!(slice_between("START only", &pair), None);
    }
}
