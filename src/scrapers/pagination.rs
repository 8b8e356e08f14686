//! Expand a category URL into its listing pages.

use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::config::{PaginationConfig, SiteProfile};
use super::fetcher::{DocumentFormat, PageFetcher};

pub struct Paginator<'a> {
    fetcher: &'a dyn PageFetcher,
    profile: &'a SiteProfile,
}

impl<'a> Paginator<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, profile: &'a SiteProfile) -> Self {
        Self { fetcher, profile }
    }

    /// Listing pages for `category_url`, starting with the category itself.
    ///
    /// Following stops when a page fails to fetch or has no next link. There
    /// is no cycle detection; a page linking to itself is followed until a
    /// fetch fails or the optional `max_pages` cap is reached.
    pub async fn paginate(&self, category_url: &str) -> Vec<String> {
        match &self.profile.pagination {
            PaginationConfig::LinkRelNext { max_pages } => {
                self.follow(category_url, *max_pages, |html, current| {
                    next_by_rel(html, current)
                })
                .await
            }
            PaginationConfig::NextButton {
                next_selector,
                next_attribute,
                max_pages,
            } => {
                self.follow(category_url, *max_pages, |html, current| {
                    next_by_selector(html, current, next_selector, next_attribute)
                })
                .await
            }
            PaginationConfig::Single => vec![category_url.to_string()],
            PaginationConfig::Unrecognized => {
                warn!(
                    "Unrecognized pagination method for {}, using the category page only",
                    self.profile.name
                );
                vec![category_url.to_string()]
            }
        }
    }

    async fn follow<F>(&self, start: &str, max_pages: Option<usize>, find_next: F) -> Vec<String>
    where
        F: Fn(&Html, &str) -> Option<String>,
    {
        let mut pages = Vec::new();
        let mut current = start.to_string();

        loop {
            if max_pages.is_some_and(|max| pages.len() >= max) {
                warn!(
                    "Stopped paginating {} after {} page(s) (max_pages)",
                    start,
                    pages.len()
                );
                break;
            }

            let doc = match self.fetcher.fetch(&current, DocumentFormat::Html).await {
                Ok(doc) => doc,
                Err(e) => {
                    debug!("Pagination stopped at {} ({}): {}", current, e.kind, e.message);
                    break;
                }
            };
            pages.push(current.clone());

            let next = {
                let html = doc.html();
                find_next(&html, &current)
            };
            match next {
                Some(next) => current = next,
                None => break,
            }
        }

        pages
    }
}

fn resolve(current: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    Url::parse(current).ok()?.join(href).ok().map(|u| u.to_string())
}

/// `rel` is a token list, so `rel="next nofollow"` counts.
fn next_by_rel(html: &Html, current: &str) -> Option<String> {
    ["link[rel~='next']", "a[rel~='next']"].iter().find_map(|sel| {
        let selector = Selector::parse(sel).ok()?;
        let href = html.select(&selector).next()?.value().attr("href")?;
        resolve(current, href)
    })
}

fn next_by_selector(html: &Html, current: &str, selector: &str, attribute: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let value = html.select(&selector).next()?.value().attr(attribute)?;
    resolve(current, value)
}
