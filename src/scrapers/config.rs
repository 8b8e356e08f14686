//! Site profile configuration types.
//!
//! A profile declares how one shop is crawled: how categories are found,
//! how listing pages chain together, how product fields are pulled out of a
//! page, and how requests are paced. Each strategy is a tagged enum keyed by
//! `method`, so an unknown discovery or extraction method fails when the
//! profile is loaded rather than halfway through a run.

use std::collections::BTreeMap;
use std::time::Duration;

use scraper::Selector;
use serde::Deserialize;
use thiserror::Error;

/// Validation failures for a deserialized profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("invalid base_url {url:?}: {message}")]
    InvalidBaseUrl { url: String, message: String },
    #[error("invalid selector for {field} ({selector:?}): {message}")]
    InvalidSelector {
        field: String,
        selector: String,
        message: String,
    },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("delay_range [{min}, {max}] must satisfy 0 <= min <= max <= {limit}", limit = MAX_DELAY_SECS)]
    InvalidDelayRange { min: f64, max: f64 },
}

/// Declarative description of how to crawl and parse one site.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteProfile {
    /// Display name; defaults to the profile key when omitted.
    #[serde(default)]
    pub name: String,
    pub base_url: String,
    #[serde(alias = "discovery")]
    pub category_discovery: DiscoveryConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    pub data_extraction: ExtractionConfig,
    #[serde(default, alias = "request")]
    pub request_config: RequestPolicy,
}

impl SiteProfile {
    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ProfileError> {
        url::Url::parse(&self.base_url).map_err(|e| ProfileError::InvalidBaseUrl {
            url: self.base_url.clone(),
            message: e.to_string(),
        })?;

        match &self.category_discovery {
            DiscoveryConfig::HrefPattern {
                patterns, selector, ..
            } => {
                if patterns.is_empty() {
                    return Err(ProfileError::Empty("category_discovery.patterns"));
                }
                check_selector("category_discovery.selector", selector)?;
            }
            DiscoveryConfig::Sitemap { sitemap_url, .. } => {
                if sitemap_url.trim().is_empty() {
                    return Err(ProfileError::Empty("category_discovery.sitemap_url"));
                }
            }
            DiscoveryConfig::UrlFile { file_path } => {
                if file_path.trim().is_empty() {
                    return Err(ProfileError::Empty("category_discovery.file_path"));
                }
            }
        }

        if let PaginationConfig::NextButton { next_selector, .. } = &self.pagination {
            check_selector("pagination.next_selector", next_selector)?;
        }

        match &self.data_extraction {
            ExtractionConfig::JsonScriptTag(cfg) => {
                if cfg.patterns.is_empty() && cfg.fallback_patterns.is_empty() {
                    return Err(ProfileError::Empty("data_extraction.patterns"));
                }
                for fallback in &cfg.fallback_patterns {
                    let JsonFallback::JsonApplicationScript { selector, .. } = fallback;
                    check_selector("data_extraction.fallback_patterns.selector", selector)?;
                }
            }
            ExtractionConfig::DomScraping(cfg) => {
                check_selector("data_extraction.product_selector", &cfg.product_selector)?;
                let single = cfg.single_product_fields.iter().flatten();
                for (name, field) in cfg.fields.iter().chain(single) {
                    if field.selector != SELF_SELECTOR {
                        check_selector(&format!("data_extraction.fields.{name}"), &field.selector)?;
                    }
                }
            }
            ExtractionConfig::JsonLd(cfg) => {
                if cfg.fields.is_empty() {
                    return Err(ProfileError::Empty("data_extraction.fields"));
                }
            }
            ExtractionConfig::AjaxApi(cfg) => {
                check_selector("data_extraction.candidate_selector", &cfg.candidate_selector)?;
            }
        }

        let [min, max] = self.request_config.delay_range;
        let in_bounds = |v: f64| v.is_finite() && (0.0..=MAX_DELAY_SECS).contains(&v);
        if !in_bounds(min) || !in_bounds(max) || min > max {
            return Err(ProfileError::InvalidDelayRange { min, max });
        }

        Ok(())
    }
}

/// Longest pause a profile may ask for between requests, in seconds.
pub const MAX_DELAY_SECS: f64 = 86_400.0;

/// Selector value that addresses the product container itself.
pub const SELF_SELECTOR: &str = "self";

fn check_selector(field: &str, selector: &str) -> Result<(), ProfileError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ProfileError::InvalidSelector {
            field: field.to_string(),
            selector: selector.to_string(),
            message: format!("{e:?}"),
        })
}

/// How category URLs are found.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum DiscoveryConfig {
    /// Scan anchors on the home page for matching hrefs.
    HrefPattern {
        patterns: Vec<String>,
        #[serde(default)]
        exclude_patterns: Vec<String>,
        #[serde(default = "default_link_selector")]
        selector: String,
    },
    /// Read `<loc>` entries from a sitemap or sitemap index.
    Sitemap {
        sitemap_url: String,
        #[serde(default)]
        category_patterns: Vec<String>,
        #[serde(default = "default_child_keywords")]
        child_keywords: Vec<String>,
        #[serde(default = "default_child_delay_ms")]
        child_delay_ms: u64,
    },
    /// Newline-delimited URL list on disk.
    UrlFile { file_path: String },
}

impl DiscoveryConfig {
    pub fn method(&self) -> &'static str {
        match self {
            Self::HrefPattern { .. } => "href_pattern",
            Self::Sitemap { .. } => "sitemap",
            Self::UrlFile { .. } => "url_file",
        }
    }
}

fn default_link_selector() -> String {
    "a[href]".to_string()
}

fn default_child_keywords() -> Vec<String> {
    ["collection", "category", "product"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_child_delay_ms() -> u64 {
    1000
}

/// How a category's listing pages chain together.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaginationConfig {
    /// Follow `<link rel="next">` (or `<a rel="next">`).
    LinkRelNext {
        #[serde(default)]
        max_pages: Option<usize>,
    },
    /// Follow a configured "next" element.
    NextButton {
        next_selector: String,
        #[serde(default = "default_next_attribute")]
        next_attribute: String,
        #[serde(default)]
        max_pages: Option<usize>,
    },
    /// Only the category URL itself.
    #[default]
    #[serde(rename = "none", alias = "url_parameter")]
    Single,
    /// Any other method; treated as a single page.
    #[serde(other)]
    Unrecognized,
}

impl PaginationConfig {
    pub fn method(&self) -> &'static str {
        match self {
            Self::LinkRelNext { .. } => "link_rel_next",
            Self::NextButton { .. } => "next_button",
            Self::Single => "none",
            Self::Unrecognized => "unrecognized (single page)",
        }
    }
}

fn default_next_attribute() -> String {
    "href".to_string()
}

/// Which extraction strategy runs against a fetched page.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ExtractionConfig {
    JsonScriptTag(EmbeddedJsonConfig),
    DomScraping(DomConfig),
    JsonLd(JsonLdConfig),
    AjaxApi(AjaxApiConfig),
}

impl ExtractionConfig {
    pub fn method(&self) -> &'static str {
        match self {
            Self::JsonScriptTag(_) => "json_script_tag",
            Self::DomScraping(_) => "dom_scraping",
            Self::JsonLd(_) => "json_ld",
            Self::AjaxApi(_) => "ajax_api",
        }
    }
}

/// A start/end marker pair delimiting a JSON blob in raw page text.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkerPair {
    pub start: String,
    pub end: String,
}

/// Successive keys into a decoded JSON document.
///
/// Keys may be written as strings or as bare integers (array indexes).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<PathKey>")]
pub struct FieldPath(pub Vec<String>);

impl FieldPath {
    pub fn keys(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for FieldPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        FieldPath(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PathKey {
    Name(String),
    Index(u64),
}

impl From<Vec<PathKey>> for FieldPath {
    fn from(keys: Vec<PathKey>) -> Self {
        FieldPath(
            keys.into_iter()
                .map(|k| match k {
                    PathKey::Name(name) => name,
                    PathKey::Index(i) => i.to_string(),
                })
                .collect(),
        )
    }
}

/// Where an embedded-JSON field comes from: a path, or (for `url_template`)
/// a format string with `{field}` placeholders.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FieldSource {
    Path(FieldPath),
    Template(String),
}

/// Configuration for JSON embedded in page text between markers.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddedJsonConfig {
    #[serde(default)]
    pub patterns: Vec<MarkerPair>,
    #[serde(default)]
    pub product_path: FieldPath,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSource>,
    #[serde(default)]
    pub fallback_patterns: Vec<JsonFallback>,
}

/// Secondary sources tried when no marker pair decodes.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum JsonFallback {
    JsonApplicationScript {
        #[serde(default = "default_json_script_selector")]
        selector: String,
        #[serde(default)]
        product_path: FieldPath,
        #[serde(default)]
        fields: BTreeMap<String, FieldSource>,
    },
}

fn default_json_script_selector() -> String {
    r#"script[type="application/json"]"#.to_string()
}

/// One field read from a DOM element.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorField {
    pub selector: String,
    #[serde(default = "default_attribute")]
    pub attribute: String,
    #[serde(default)]
    pub prefix: Option<String>,
}

fn default_attribute() -> String {
    "text".to_string()
}

/// Configuration for CSS-selector scraping.
#[derive(Debug, Clone, Deserialize)]
pub struct DomConfig {
    pub product_selector: String,
    #[serde(default)]
    pub fields: BTreeMap<String, SelectorField>,
    #[serde(default)]
    pub single_product_fields: Option<BTreeMap<String, SelectorField>>,
}

/// Configuration for schema.org JSON-LD blocks.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonLdConfig {
    #[serde(default = "default_json_ld_type")]
    pub json_ld_type: String,
    pub fields: BTreeMap<String, FieldPath>,
}

fn default_json_ld_type() -> String {
    "Product".to_string()
}

/// Configuration for pages that load products client-side.
#[derive(Debug, Clone, Deserialize)]
pub struct AjaxApiConfig {
    #[serde(default)]
    pub api_type: String,
    #[serde(default)]
    pub algolia_indices: serde_json::Value,
    #[serde(default)]
    pub products_in_initial_load: bool,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub ajax_indicators: Vec<String>,
    #[serde(default)]
    pub fallback_method: Option<String>,
    #[serde(default)]
    pub patterns: Vec<MarkerPair>,
    #[serde(default)]
    pub product_path: FieldPath,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSource>,
    #[serde(default = "default_candidate_selector")]
    pub candidate_selector: String,
}

impl AjaxApiConfig {
    /// The embedded-JSON configuration to delegate to, when one is set up.
    pub fn json_fallback(&self) -> Option<EmbeddedJsonConfig> {
        if self.fallback_method.as_deref() != Some("json_script_tag") || self.patterns.is_empty() {
            return None;
        }
        Some(EmbeddedJsonConfig {
            patterns: self.patterns.clone(),
            product_path: self.product_path.clone(),
            fields: self.fields.clone(),
            fallback_patterns: Vec::new(),
        })
    }
}

fn default_candidate_selector() -> String {
    "[data-product-id], .product".to_string()
}

/// Browser family a request impersonates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum UserAgentFamily {
    #[default]
    Chrome,
    Firefox,
    Safari,
    /// Chrome strings with the `Chrome` token rewritten to `Version`.
    ChromeModified,
}

impl UserAgentFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Firefox => "firefox",
            Self::Safari => "safari",
            Self::ChromeModified => "chrome_modified",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "chrome" => Some(Self::Chrome),
            "firefox" => Some(Self::Firefox),
            "safari" => Some(Self::Safari),
            "chrome_modified" => Some(Self::ChromeModified),
            _ => None,
        }
    }
}

impl From<String> for UserAgentFamily {
    fn from(s: String) -> Self {
        Self::from_str(&s.to_lowercase()).unwrap_or_default()
    }
}

/// Details a profile can pin after finding a combination that works.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkingDetails {
    #[serde(default)]
    pub user_agent_string: Option<String>,
    #[serde(default)]
    pub working_proxy: Option<String>,
}

/// Request pacing and escalation policy.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestPolicy {
    /// Lower bound applied to every attempt's timeout, in seconds.
    #[serde(default, alias = "timeout")]
    pub timeout_secs: Option<u64>,
    /// Inclusive delay range in seconds between network operations.
    #[serde(default = "default_delay_range")]
    pub delay_range: [f64; 2],
    #[serde(default)]
    pub user_agent_type: UserAgentFamily,
    /// Allow the proxy steps of the escalation ladder.
    #[serde(default)]
    pub use_proxy: bool,
    #[serde(default)]
    pub proxies: Vec<String>,
    #[serde(default)]
    pub working_details: WorkingDetails,
    #[serde(default)]
    pub max_attempts: Option<usize>,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            delay_range: default_delay_range(),
            user_agent_type: UserAgentFamily::default(),
            use_proxy: false,
            proxies: Vec::new(),
            working_details: WorkingDetails::default(),
            max_attempts: None,
        }
    }
}

fn default_delay_range() -> [f64; 2] {
    [1.0, 3.0]
}

impl RequestPolicy {
    /// Sample a pause from `delay_range`.
    pub fn sample_delay(&self) -> Duration {
        let [min, max] = self.delay_range;
        let min = min.clamp(0.0, MAX_DELAY_SECS);
        let max = max.clamp(min, MAX_DELAY_SECS);
        Duration::try_from_secs_f64(min + fastrand::f64() * (max - min)).unwrap_or_default()
    }

    /// Whether any proxy is available to the ladder's proxy steps.
    pub fn has_proxy(&self) -> bool {
        self.working_details.working_proxy.is_some() || !self.proxies.is_empty()
    }

    /// Pick a proxy, preferring a pinned working proxy.
    pub fn pick_proxy(&self) -> Option<&str> {
        if let Some(proxy) = self.working_details.working_proxy.as_deref() {
            return Some(proxy);
        }
        if self.proxies.is_empty() {
            return None;
        }
        Some(self.proxies[fastrand::usize(..self.proxies.len())].as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(json: serde_json::Value) -> SiteProfile {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_embedded_json_profile() {
        let p = profile(serde_json::json!({
            "name": "Shop",
            "base_url": "https://shop.example",
            "category_discovery": {"method": "href_pattern", "patterns": ["/c/"]},
            "pagination": {"method": "link_rel_next"},
            "data_extraction": {
                "method": "json_script_tag",
                "patterns": [{"start": "window.__DATA__ = ", "end": ";</script>"}],
                "product_path": ["props", "items", 0, "products"],
                "fields": {
                    "id": ["sku"],
                    "price": ["price", "now"],
                    "url_template": "https://shop.example/p/{id}"
                }
            },
            "request_config": {"timeout": 20, "delay_range": [2, 4], "user_agent_type": "safari"}
        }));

        p.validate().unwrap();
        let ExtractionConfig::JsonScriptTag(cfg) = &p.data_extraction else {
            panic!("wrong strategy");
        };
        assert_eq!(cfg.product_path.keys(), ["props", "items", "0", "products"]);
        assert!(matches!(cfg.fields.get("url_template"), Some(FieldSource::Template(_))));
        assert!(matches!(cfg.fields.get("price"), Some(FieldSource::Path(_))));
        assert_eq!(p.request_config.timeout_secs, Some(20));
        assert_eq!(p.request_config.user_agent_type, UserAgentFamily::Safari);
        assert!(matches!(p.pagination, PaginationConfig::LinkRelNext { max_pages: None }));
    }

    #[test]
    fn test_unknown_extraction_method_fails() {
        let result: Result<SiteProfile, _> = serde_json::from_value(serde_json::json!({
            "base_url": "https://shop.example",
            "category_discovery": {"method": "url_file", "file_path": "urls.txt"},
            "data_extraction": {"method": "telepathy"}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_pagination_fallbacks() {
        let p = profile(serde_json::json!({
            "base_url": "https://shop.example",
            "category_discovery": {"method": "url_file", "file_path": "urls.txt"},
            "pagination": {"method": "url_parameter", "param": "page"},
            "data_extraction": {"method": "json_ld", "fields": {"id": ["sku"]}}
        }));
        assert!(matches!(p.pagination, PaginationConfig::Single));

        let p = profile(serde_json::json!({
            "base_url": "https://shop.example",
            "category_discovery": {"method": "url_file", "file_path": "urls.txt"},
            "pagination": {"method": "infinite_scroll"},
            "data_extraction": {"method": "json_ld", "fields": {"id": ["sku"]}}
        }));
        assert!(matches!(p.pagination, PaginationConfig::Unrecognized));
    }

    #[test]
    fn test_validate_rejects_bad_selector() {
        let p = profile(serde_json::json!({
            "base_url": "https://shop.example",
            "category_discovery": {"method": "href_pattern", "patterns": ["/c/"]},
            "data_extraction": {
                "method": "dom_scraping",
                "product_selector": "div[[",
                "fields": {}
            }
        }));
        assert!(matches!(
            p.validate(),
            Err(ProfileError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_delay_range() {
        let p = profile(serde_json::json!({
            "base_url": "https://shop.example",
            "category_discovery": {"method": "url_file", "file_path": "urls.txt"},
            "data_extraction": {"method": "json_ld", "fields": {"id": ["sku"]}},
            "request_config": {"delay_range": [5, 1]}
        }));
        assert!(matches!(
            p.validate(),
            Err(ProfileError::InvalidDelayRange { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_unbounded_delay_range() {
        for range in [serde_json::json!([1e300, 1e300]), serde_json::json!([1, 1e9])] {
            let p = profile(serde_json::json!({
                "base_url": "https://shop.example",
                "category_discovery": {"method": "url_file", "file_path": "urls.txt"},
                "data_extraction": {"method": "json_ld", "fields": {"id": ["sku"]}},
                "request_config": {"delay_range": range}
            }));
            assert!(matches!(
                p.validate(),
                Err(ProfileError::InvalidDelayRange { .. })
            ));
            // Sampling an unvalidated profile still never panics.
            assert!(p.request_config.sample_delay() <= Duration::from_secs(86_400));
        }
    }

    #[test]
    fn test_ajax_fallback_only_when_configured() {
        let cfg: AjaxApiConfig = serde_json::from_value(serde_json::json!({
            "api_type": "algolia",
            "fallback_method": "json_script_tag",
            "patterns": [{"start": "a", "end": "b"}]
        }))
        .unwrap();
        assert!(cfg.json_fallback().is_some());

        let cfg: AjaxApiConfig =
            serde_json::from_value(serde_json::json!({"api_type": "algolia"})).unwrap();
        assert!(cfg.json_fallback().is_none());
    }

    #[test]
    fn test_unknown_user_agent_defaults_to_chrome() {
        assert_eq!(UserAgentFamily::from("lynx".to_string()), UserAgentFamily::Chrome);
        assert_eq!(
            UserAgentFamily::from("Chrome_Modified".to_string()),
            UserAgentFamily::ChromeModified
        );
    }

    #[test]
    fn test_sample_delay_within_range() {
        let policy = RequestPolicy::default();
        for _ in 0..50 {
            let d = policy.sample_delay();
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(3));
        }
    }
}
