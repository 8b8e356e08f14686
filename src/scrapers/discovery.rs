//! Category discovery.
//!
//! Discovery is best-effort: any failure to fetch or read the backing source
//! is logged and produces an empty set, never an error.

use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use scraper::Selector;
use tracing::{debug, info, warn};
use url::Url;

use super::config::{DiscoveryConfig, SiteProfile};
use super::fetcher::{DocumentFormat, PageFetcher};

// Fallback for sitemaps that are not well-formed XML.
static LOC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(?:\w+:)?loc>\s*(?:<!\[CDATA\[)?\s*(.*?)\s*(?:\]\]>)?\s*</(?:\w+:)?loc>").unwrap()
});

/// Finds a profile's category listing URLs.
pub struct CategoryDiscoverer<'a> {
    fetcher: &'a dyn PageFetcher,
    profile: &'a SiteProfile,
}

impl<'a> CategoryDiscoverer<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, profile: &'a SiteProfile) -> Self {
        Self { fetcher, profile }
    }

    pub async fn discover(&self) -> BTreeSet<String> {
        let found = match &self.profile.category_discovery {
            DiscoveryConfig::HrefPattern {
                patterns,
                exclude_patterns,
                selector,
            } => self.by_href_pattern(patterns, exclude_patterns, selector).await,
            DiscoveryConfig::Sitemap {
                sitemap_url,
                category_patterns,
                child_keywords,
                child_delay_ms,
            } => {
                self.from_sitemap(
                    sitemap_url,
                    category_patterns,
                    child_keywords,
                    Duration::from_millis(*child_delay_ms),
                )
                .await
            }
            DiscoveryConfig::UrlFile { file_path } => from_file(file_path).await,
        };

        info!(
            "Discovered {} category URL(s) for {} via {}",
            found.len(),
            self.profile.name,
            self.profile.category_discovery.method()
        );
        found
    }

    async fn by_href_pattern(
        &self,
        patterns: &[String],
        exclude_patterns: &[String],
        selector: &str,
    ) -> BTreeSet<String> {
        let base_url = &self.profile.base_url;
        let doc = match self.fetcher.fetch(base_url, DocumentFormat::Html).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Category discovery could not fetch {} ({}): {}", base_url, e.kind, e.message);
                return BTreeSet::new();
            }
        };
        let (Ok(selector), Ok(base)) = (Selector::parse(selector), Url::parse(base_url)) else {
            return BTreeSet::new();
        };

        let html = doc.html();
        html.select(&selector)
            .filter_map(|el| el.value().attr("href"))
            .filter(|href| patterns.iter().any(|p| href.contains(p.as_str())))
            .filter(|href| !exclude_patterns.iter().any(|p| href.contains(p.as_str())))
            .filter_map(|href| base.join(href).ok())
            .map(|url| url.to_string())
            .collect()
    }

    async fn from_sitemap(
        &self,
        sitemap_url: &str,
        category_patterns: &[String],
        child_keywords: &[String],
        child_delay: Duration,
    ) -> BTreeSet<String> {
        let url = match Url::parse(&self.profile.base_url).and_then(|b| b.join(sitemap_url)) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!("Invalid sitemap URL {:?}: {}", sitemap_url, e);
                return BTreeSet::new();
            }
        };
        let doc = match self.fetcher.fetch(&url, DocumentFormat::Xml).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Could not fetch sitemap {} ({}): {}", url, e.kind, e.message);
                return BTreeSet::new();
            }
        };

        let matches = |loc: &String| category_patterns.iter().any(|p| loc.contains(p.as_str()));

        let sitemap = Sitemap::parse(&doc.body);
        if !sitemap.is_index {
            return sitemap.locs.into_iter().filter(matches).collect();
        }

        let children: Vec<String> = sitemap
            .locs
            .into_iter()
            .filter(|loc| {
                let lower = loc.to_lowercase();
                child_keywords.iter().any(|k| lower.contains(&k.to_lowercase()))
            })
            .collect();
        debug!("Sitemap index {} has {} relevant child sitemap(s)", url, children.len());

        let mut found = BTreeSet::new();
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(child_delay).await;
            }
            match self.fetcher.fetch(child, DocumentFormat::Xml).await {
                Ok(child_doc) => {
                    found.extend(Sitemap::parse(&child_doc.body).locs.into_iter().filter(matches));
                }
                Err(e) => warn!("Could not fetch child sitemap {} ({}): {}", child, e.kind, e.message),
            }
        }
        found
    }
}

async fn from_file(file_path: &str) -> BTreeSet<String> {
    let path = shellexpand::tilde(file_path).into_owned();
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => parse_url_list(&contents),
        Err(e) => {
            warn!("Could not read URL file {}: {}", path, e);
            BTreeSet::new()
        }
    }
}

/// One URL per line; blank lines and `#` comments are ignored.
pub fn parse_url_list(contents: &str) -> BTreeSet<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// The `<loc>` entries of a sitemap or sitemap index.
#[derive(Debug, Default, PartialEq)]
pub struct Sitemap {
    pub is_index: bool,
    pub locs: Vec<String>,
}

impl Sitemap {
    /// Element names are matched without their namespace prefix; CDATA and
    /// entities are resolved by the XML parser.
    pub fn parse(xml: &str) -> Self {
        let doc = match roxmltree::Document::parse(xml.trim_start_matches('\u{feff}')) {
            Ok(doc) => doc,
            Err(e) => {
                debug!("Sitemap is not well-formed XML ({}), scanning for <loc>", e);
                return Self::scan(xml);
            }
        };

        let locs = doc
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "loc")
            .map(|n| {
                n.descendants()
                    .filter(|t| t.is_text())
                    .filter_map(|t| t.text())
                    .collect::<String>()
                    .trim()
                    .to_string()
            })
            .filter(|loc| !loc.is_empty())
            .collect();

        Self {
            is_index: doc.root_element().tag_name().name() == "sitemapindex",
            locs,
        }
    }

    fn scan(xml: &str) -> Self {
        Self {
            is_index: xml.contains("sitemapindex>") || xml.contains("<sitemapindex"),
            locs: LOC
                .captures_iter(xml)
                .map(|caps| caps[1].replace("&amp;", "&"))
                .filter(|loc| !loc.is_empty())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::fetcher::testing::StaticFetcher;

    fn profile(discovery: serde_json::Value) -> SiteProfile {
        serde_json::from_value(serde_json::json!({
            "name": "Shop",
            "base_url": "https://shop.example/",
            "category_discovery": discovery,
            "data_extraction": {"method": "json_ld", "fields": {"id": ["sku"]}}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_href_pattern() {
        let fetcher = StaticFetcher::new().page(
            "https://shop.example/",
            r#"<a href="/collections/hats">Hats</a>
               <a href="/collections/hats">Hats again</a>
               <a href="https://shop.example/collections/sale-outlet">Outlet</a>
               <a href="/pages/about">About</a>
               <a>No href</a>"#,
        );
        let p = profile(serde_json::json!({
            "method": "href_pattern",
            "patterns": ["/collections/"],
            "exclude_patterns": ["outlet"]
        }));

        let found = CategoryDiscoverer::new(&fetcher, &p).discover().await;
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["https://shop.example/collections/hats".to_string()]
        );
    }

    #[tokio::test]
    async fn test_sitemap_index() {
        let fetcher = StaticFetcher::new()
            .page(
                "https://shop.example/sitemap.xml",
                r#"<?xml version="1.0"?><sitemapindex>
                    <sitemap><loc>https://shop.example/sitemap_collections_1.xml</loc></sitemap>
                    <sitemap><loc>https://shop.example/sitemap_blogs_1.xml</loc></sitemap>
                </sitemapindex>"#,
            )
            .page(
                "https://shop.example/sitemap_collections_1.xml",
                r#"<urlset>
                    <url><loc>https://shop.example/collections/hats?a=1&amp;b=2</loc></url>
                    <url><loc>https://shop.example/pages/faq</loc></url>
                </urlset>"#,
            );
        let p = profile(serde_json::json!({
            "method": "sitemap",
            "sitemap_url": "/sitemap.xml",
            "category_patterns": ["/collections/"],
            "child_delay_ms": 0
        }));

        let found = CategoryDiscoverer::new(&fetcher, &p).discover().await;
        assert_eq!(found.len(), 1);
        assert!(found.contains("https://shop.example/collections/hats?a=1&b=2"));
        assert!(!fetcher
            .fetched()
            .contains(&"https://shop.example/sitemap_blogs_1.xml".to_string()));
    }

    #[test]
    fn test_sitemap_cdata_and_prefixes() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
              <sm:url><sm:loc><![CDATA[https://shop.example/collections/hats?a=1&b=2]]></sm:loc></sm:url>
              <sm:url><sm:loc> https://shop.example/collections/caps?x=1&amp;y=2 </sm:loc></sm:url>
            </sm:urlset>"#;
        let sitemap = Sitemap::parse(xml);
        assert!(!sitemap.is_index);
        assert_eq!(
            sitemap.locs,
            vec![
                "https://shop.example/collections/hats?a=1&b=2",
                "https://shop.example/collections/caps?x=1&y=2"
            ]
        );
    }

    #[test]
    fn test_malformed_sitemap_is_scanned() {
        let xml = "<sitemapindex><sitemap><loc><![CDATA[https://shop.example/s1.xml]]></loc></sitemap>\
                   <sitemap><loc>https://shop.example/s2.xml?a&amp;b</loc>";
        let sitemap = Sitemap::parse(xml);
        assert!(sitemap.is_index);
        assert_eq!(
            sitemap.locs,
            vec!["https://shop.example/s1.xml", "https://shop.example/s2.xml?a&b"]
        );
    }

    #[tokio::test]
    async fn test_empty_category_patterns_match_nothing() {
        let fetcher = StaticFetcher::new().page(
            "https://shop.example/sitemap.xml",
            "<urlset><url><loc>https://shop.example/collections/a</loc></url></urlset>",
        );
        let p = profile(serde_json::json!({"method": "sitemap", "sitemap_url": "sitemap.xml"}));
        assert!(CategoryDiscoverer::new(&fetcher, &p).discover().await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_empty() {
        let fetcher = StaticFetcher::new();
        let p = profile(serde_json::json!({"method": "href_pattern", "patterns": ["/c/"]}));
        assert!(CategoryDiscoverer::new(&fetcher, &p).discover().await.is_empty());
    }

    #[tokio::test]
    async fn test_url_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(
            &path,
            "# categories\nhttps://shop.example/c/1\n\n  https://shop.example/c/2  \nhttps://shop.example/c/1\n",
        )
        .unwrap();
        let p = profile(serde_json::json!({"method": "url_file", "file_path": path.to_str().unwrap()}));

        let fetcher = StaticFetcher::new();
        let found = CategoryDiscoverer::new(&fetcher, &p).discover().await;
        assert_eq!(found.len(), 2);
        assert!(found.contains("https://shop.example/c/2"));

        let missing = profile(serde_json::json!({"method": "url_file", "file_path": "/nonexistent/urls.txt"}));
        assert!(CategoryDiscoverer::new(&fetcher, &missing).discover().await.is_empty());
    }
}
