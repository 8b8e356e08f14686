//! Extract products from schema.org JSON-LD blocks.

use scraper::Selector;
use serde_json::Value;
use tracing::debug;

use super::path::resolve;
use super::{is_truthy, ExtractionStrategy, RawFieldMap};
use crate::scrapers::config::JsonLdConfig;
use crate::scrapers::fetcher::Document;

pub struct JsonLdStrategy {
    config: JsonLdConfig,
}

impl JsonLdStrategy {
    pub fn new(config: JsonLdConfig) -> Self {
        Self { config }
    }

    fn has_type(&self, node: &Value) -> bool {
        match node.get("@type") {
            Some(Value::String(t)) => *t == self.config.json_ld_type,
            Some(Value::Array(types)) => types
                .iter()
                .any(|t| t.as_str() == Some(self.config.json_ld_type.as_str())),
            _ => false,
        }
    }

    /// Objects worth checking: the payload, members of a top-level array and
    /// members of an `@graph`.
    fn candidates<'a>(&self, payload: &'a Value) -> Vec<&'a Value> {
        let top: Vec<&Value> = match payload {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        let mut out = Vec::new();
        for node in top {
            out.push(node);
            if let Some(Value::Array(graph)) = node.get("@graph") {
                out.extend(graph.iter());
            }
        }
        out
    }

    fn map_product(&self, node: &Value) -> RawFieldMap {
        self.config
            .fields
            .iter()
            .filter_map(|(name, path)| {
                let value = resolve(node, path.keys())?;
                is_truthy(value).then(|| (name.clone(), value.clone()))
            })
            .collect()
    }
}

impl ExtractionStrategy for JsonLdStrategy {
    fn extract(&self, doc: &Document) -> Vec<RawFieldMap> {
        let html = doc.html();
        let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
            return Vec::new();
        };

        let mut products = Vec::new();
        for script in html.select(&selector) {
            let text: String = script.text().collect();
            let payload: Value = match serde_json::from_str(text.trim()) {
                Ok(v) => v,
                Err(e) => {
                    debug!("Skipping undecodable JSON-LD block on {}: {}", doc.url, e);
                    continue;
                }
            };
            for node in self.candidates(&payload) {
                if !self.has_type(node) {
                    continue;
                }
                let record = self.map_product(node);
                if !record.is_empty() {
                    products.push(record);
                }
            }
        }

        if products.is_empty() {
            debug!("No {} JSON-LD objects on {}", self.config.json_ld_type, doc.url);
        }
        products
    }

    fn name(&self) -> &'static str {
        "json_ld"
    }
}
