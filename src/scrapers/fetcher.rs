//! Page fetching contract shared by discovery, pagination and extraction.

use std::fmt;

use async_trait::async_trait;
use scraper::Html;
use thiserror::Error;

/// What a caller expects back from a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Html,
    Xml,
    Json,
}

impl DocumentFormat {
    pub fn accept_header(&self) -> &'static str {
        match self {
            Self::Html => "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            Self::Xml => "application/xml,text/xml;q=0.9,*/*;q=0.8",
            Self::Json => "application/json,text/plain;q=0.9,*/*;q=0.8",
        }
    }
}

/// A fetched page body.
#[derive(Debug, Clone)]
pub struct Document {
    pub url: String,
    pub format: DocumentFormat,
    pub body: String,
}

impl Document {
    pub fn new(url: impl Into<String>, format: DocumentFormat, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format,
            body: body.into(),
        }
    }

    /// Parse the body as an HTML tree.
    pub fn html(&self) -> Html {
        Html::parse_document(&self.body)
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Why a fetch ultimately failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    Proxy,
    Connection,
    HttpStatus(u16),
    Other,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Proxy => write!(f, "proxy"),
            Self::Connection => write!(f, "connection"),
            Self::HttpStatus(code) => write!(f, "http {code}"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// The last failure seen after every attempt for a URL was exhausted.
#[derive(Debug, Clone, Error)]
#[error("fetch of {url} failed after {attempts} attempt(s) ({kind}): {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub url: String,
    pub message: String,
    pub attempts: usize,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, url: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.to_string(),
            message: message.into(),
            attempts: 1,
        }
    }
}

/// Retrieves page content for a URL.
///
/// Implementations own any retry or escalation policy; callers see only the
/// final outcome.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, format: DocumentFormat) -> Result<Document, FetchError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory fetcher for tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Serves canned bodies keyed by URL; anything else is a 404.
    #[derive(Default)]
    pub struct StaticFetcher {
        pages: HashMap<String, String>,
        hits: Mutex<HashMap<String, usize>>,
        log: Mutex<Vec<String>>,
        max_hits_per_url: Option<usize>,
    }

    impl StaticFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }

        /// Fail with a timeout once a URL has been served this many times.
        pub fn max_hits_per_url(mut self, max: usize) -> Self {
            self.max_hits_per_url = Some(max);
            self
        }

        pub fn fetched(&self) -> Vec<String> {
            self.log.lock().map(|l| l.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str, format: DocumentFormat) -> Result<Document, FetchError> {
            self.log.lock().unwrap().push(url.to_string());

            let count = {
                let mut hits = self.hits.lock().unwrap();
                let count = hits.entry(url.to_string()).or_insert(0);
                *count += 1;
                *count
            };
            if self.max_hits_per_url.is_some_and(|max| count > max) {
                return Err(FetchError::new(FetchErrorKind::Timeout, url, "hit limit"));
            }

            match self.pages.get(url) {
                Some(body) => Ok(Document::new(url, format, body.clone())),
                None => Err(FetchError::new(
                    FetchErrorKind::HttpStatus(404),
                    url,
                    "not found",
                )),
            }
        }
    }
}
