//! Product extraction strategies.
//!
//! Every strategy turns one fetched page into zero or more [`RawFieldMap`]s.
//! Strategies never fail a page outright: anything they cannot make sense
//! of is logged and yields an empty list.

mod ajax;
mod dom;
mod embedded_json;
mod json_ld;
pub mod path;
pub mod price;

pub use ajax::AjaxApiStrategy;
pub use dom::DomStrategy;
pub use embedded_json::EmbeddedJsonStrategy;
pub use json_ld::JsonLdStrategy;

use std::collections::BTreeMap;

use serde_json::Value;

use super::config::ExtractionConfig;
use super::fetcher::Document;

/// Loosely typed record keyed by canonical field name (`id`, `name`,
/// `price`, `url`). Unresolved fields are absent.
pub type RawFieldMap = BTreeMap<String, Value>;

/// Common interface of the extraction strategies.
pub trait ExtractionStrategy: Send + Sync {
    fn extract(&self, doc: &Document) -> Vec<RawFieldMap>;

    fn name(&self) -> &'static str;
}

/// Routes a page to the strategy its profile selects.
pub struct ExtractionDispatcher {
    strategy: Box<dyn ExtractionStrategy>,
}

impl ExtractionDispatcher {
    pub fn new(config: &ExtractionConfig) -> Self {
        let strategy: Box<dyn ExtractionStrategy> = match config {
            ExtractionConfig::JsonScriptTag(cfg) => Box::new(EmbeddedJsonStrategy::new(cfg.clone())),
            ExtractionConfig::DomScraping(cfg) => Box::new(DomStrategy::new(cfg.clone())),
            ExtractionConfig::JsonLd(cfg) => Box::new(JsonLdStrategy::new(cfg.clone())),
            ExtractionConfig::AjaxApi(cfg) => Box::new(AjaxApiStrategy::new(cfg.clone())),
        };
        Self { strategy }
    }

    pub fn extract(&self, doc: &Document) -> Vec<RawFieldMap> {
        let records = self.strategy.extract(doc);
        tracing::debug!(
            "{} extracted {} record(s) from {}",
            self.strategy.name(),
            records.len(),
            doc.url
        );
        records
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }
}

/// Render a scalar JSON value as text; `None` for null, arrays and objects.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// JSON-style truthiness: null, `false`, `0`, `""`, `[]` and `{}` are falsy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
