//! HTTP page fetcher with an escalating retry ladder.

mod ladder;
mod user_agent;

pub use ladder::{ladder_for, AttemptDescriptor, ESCALATION_LADDER};
pub use user_agent::{resolve_user_agent, user_agent_for};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::config::RequestPolicy;
use super::fetcher::{Document, DocumentFormat, FetchError, FetchErrorKind, PageFetcher};

/// Fetches pages over HTTP, escalating through [`ESCALATION_LADDER`] until
/// one attempt returns 200 OK.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    policy: RequestPolicy,
    attempts: Vec<AttemptDescriptor>,
}

impl HttpClient {
    /// Create a client for one profile's request policy.
    pub fn new(policy: &RequestPolicy) -> Result<Self, reqwest::Error> {
        let client = Self::builder().build()?;
        Ok(Self {
            client,
            attempts: ladder_for(policy),
            policy: policy.clone(),
        })
    }

    fn builder() -> reqwest::ClientBuilder {
        Client::builder()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
    }

    /// The attempts this client will make for each URL.
    pub fn attempts(&self) -> &[AttemptDescriptor] {
        &self.attempts
    }

    fn client_for(&self, attempt: &AttemptDescriptor) -> Result<(Client, Option<String>), FetchError> {
        if !attempt.use_proxy {
            return Ok((self.client.clone(), None));
        }
        let Some(proxy_url) = self.policy.pick_proxy() else {
            return Ok((self.client.clone(), None));
        };
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| FetchError::new(FetchErrorKind::Proxy, proxy_url, e.to_string()))?;
        let client = Self::builder()
            .proxy(proxy)
            .build()
            .map_err(|e| FetchError::new(FetchErrorKind::Proxy, proxy_url, e.to_string()))?;
        Ok((client, Some(proxy_url.to_string())))
    }

    async fn attempt(
        &self,
        url: &str,
        format: DocumentFormat,
        attempt: &AttemptDescriptor,
    ) -> Result<Document, FetchError> {
        let (client, proxy) = self.client_for(attempt)?;
        let user_agent = resolve_user_agent(attempt.user_agent, &self.policy);

        let response = client
            .get(url)
            .timeout(attempt.timeout)
            .header("User-Agent", user_agent)
            .header("Accept", format.accept_header())
            .header("Accept-Language", "en-GB,en;q=0.9")
            .header("DNT", "1")
            .header("Connection", "keep-alive")
            .header("Upgrade-Insecure-Requests", "1")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .header("Sec-Fetch-User", "?1")
            .header("Cache-Control", "max-age=0")
            .send()
            .await
            .map_err(|e| classify(url, &e, proxy.is_some()))?;

        let status = response.status();
        if status != StatusCode::OK {
            match status.as_u16() {
                403 => warn!("{} returned 403 (possible anti-bot protection)", url),
                429 => warn!("{} returned 429 (rate limited)", url),
                _ => {}
            }
            return Err(FetchError::new(
                FetchErrorKind::HttpStatus(status.as_u16()),
                url,
                format!("unexpected status {status}"),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify(url, &e, proxy.is_some()))?;
        Ok(Document::new(url, format, body))
    }
}

fn classify(url: &str, error: &reqwest::Error, via_proxy: bool) -> FetchError {
    let kind = if error.is_timeout() {
        FetchErrorKind::Timeout
    } else if error.is_connect() {
        if via_proxy {
            FetchErrorKind::Proxy
        } else {
            FetchErrorKind::Connection
        }
    } else if let Some(status) = error.status() {
        FetchErrorKind::HttpStatus(status.as_u16())
    } else {
        FetchErrorKind::Other
    };
    FetchError::new(kind, url, error.to_string())
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &str, format: DocumentFormat) -> Result<Document, FetchError> {
        let mut last_error = FetchError::new(FetchErrorKind::Other, url, "no attempts configured");

        for (i, attempt) in self.attempts.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(attempt.delay).await;
            }

            debug!(
                "Fetching {} (attempt {}/{}, {}, timeout {:?}{})",
                url,
                i + 1,
                self.attempts.len(),
                attempt.user_agent.as_str(),
                attempt.timeout,
                if attempt.use_proxy { ", proxy" } else { "" }
            );

            match self.attempt(url, format, attempt).await {
                Ok(doc) => return Ok(doc),
                Err(mut e) => {
                    debug!("Attempt {} for {} failed: {}", i + 1, url, e.kind);
                    e.attempts = i + 1;
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
