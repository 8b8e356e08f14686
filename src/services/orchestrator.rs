//! Full scrape runs for one site profile.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::repository::{DieselDbContext, DieselLinkRepository};
use crate::scrapers::{
    CategoryDiscoverer, DocumentFormat, ExtractionDispatcher, PageFetcher, Paginator, SiteProfile,
};

use super::notify::Notifier;
use super::reconcile::{ReconcileOutcome, Reconciler};

/// Counters for the lifetime of one orchestrator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub pages_checked: usize,
    pub pages_failed: usize,
    pub records_seen: usize,
    pub records_new: usize,
    pub records_updated: usize,
    pub records_rejected: usize,
    pub drops_alerted: usize,
}

impl RunStats {
    fn absorb(&mut self, outcome: &ReconcileOutcome) {
        self.records_seen += outcome.seen();
        self.records_new += outcome.inserted;
        self.records_updated += outcome.updated;
        self.records_rejected += outcome.rejected;
        self.drops_alerted += outcome.change_events.len();
    }
}

/// Result of [`Orchestrator::run_full_scrape`].
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub site: String,
    pub categories: Vec<String>,
    pub pages: usize,
    pub stats: RunStats,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// Drives discovery, pagination, extraction and reconciliation for a site.
pub struct Orchestrator {
    profile: SiteProfile,
    fetcher: Arc<dyn PageFetcher>,
    links: DieselLinkRepository,
    dispatcher: ExtractionDispatcher,
    reconciler: Reconciler,
    config_hash: Option<String>,
    stats: RunStats,
}

impl Orchestrator {
    pub fn new(
        profile: SiteProfile,
        fetcher: Arc<dyn PageFetcher>,
        db: &DieselDbContext,
        notifier: Arc<dyn Notifier>,
        threshold_percent: f64,
    ) -> Self {
        let dispatcher = ExtractionDispatcher::new(&profile.data_extraction);
        let reconciler = Reconciler::new(db.products(), notifier, &profile.name, threshold_percent);
        Self {
            profile,
            fetcher,
            links: db.links(),
            dispatcher,
            reconciler,
            config_hash: None,
            stats: RunStats::default(),
        }
    }

    /// Tag run logs with the configuration they came from.
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    pub fn site(&self) -> &str {
        &self.profile.name
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn threshold_percent(&self) -> f64 {
        self.reconciler.threshold_percent()
    }

    async fn pause(&self) {
        let delay = self.profile.request_config.sample_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Discover category URLs and record them.
    pub async fn discover_categories(&self) -> Vec<String> {
        let found = CategoryDiscoverer::new(self.fetcher.as_ref(), &self.profile)
            .discover()
            .await;

        let now = Utc::now();
        let mut added = 0;
        for url in &found {
            match self.links.record_category(url, self.site(), now).await {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => warn!("Could not record category {}: {}", url, e),
            }
        }
        debug!("{} new category link(s) for {}", added, self.site());

        found.into_iter().collect()
    }

    /// Category URLs stored by earlier runs.
    pub async fn known_categories(&self) -> Vec<String> {
        match self.links.categories(self.site()).await {
            Ok(links) => links.into_iter().map(|l| l.url).collect(),
            Err(e) => {
                warn!("Could not load stored categories for {}: {}", self.site(), e);
                Vec::new()
            }
        }
    }

    /// Expand categories into listing pages, recording each page.
    pub async fn collect_pages(&self, categories: &[String]) -> Vec<String> {
        let paginator = Paginator::new(self.fetcher.as_ref(), &self.profile);
        let mut pages = Vec::new();

        for (i, category) in categories.iter().enumerate() {
            if i > 0 {
                self.pause().await;
            }
            let found = paginator.paginate(category).await;
            debug!("{} page(s) under {}", found.len(), category);

            let now = Utc::now();
            for page in &found {
                if let Err(e) = self
                    .links
                    .record_page(page, Some(category), self.site(), now)
                    .await
                {
                    warn!("Could not record page {}: {}", page, e);
                }
            }
            pages.extend(found);
        }

        pages
    }

    /// Fetch, extract and reconcile one listing page.
    ///
    /// Returns `None` when the page could not be fetched or its records could
    /// not be stored; either way the failure is logged and counted.
    pub async fn check_page(&mut self, url: &str) -> Option<ReconcileOutcome> {
        let doc = match self.fetcher.fetch(url, DocumentFormat::Html).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(
                    "Skipping {} after {} attempt(s) ({}): {}",
                    url, e.attempts, e.kind, e.message
                );
                self.stats.pages_failed += 1;
                return None;
            }
        };

        let records = self.dispatcher.extract(&doc);
        if records.is_empty() {
            debug!("No products on {} via {}", url, self.dispatcher.strategy_name());
        }

        match self.reconciler.reconcile(&records).await {
            Ok(outcome) => {
                self.stats.pages_checked += 1;
                self.stats.absorb(&outcome);
                debug!(
                    "{}: {} new, {} lower, {} unchanged, {} rejected",
                    url, outcome.inserted, outcome.updated, outcome.unchanged, outcome.rejected
                );
                Some(outcome)
            }
            Err(e) => {
                warn!("Could not store products from {}: {}", url, e);
                self.stats.pages_failed += 1;
                None
            }
        }
    }

    /// Discover, paginate and check every listing page once.
    pub async fn run_full_scrape(&mut self) -> RunSummary {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let before = self.stats.clone();

        info!(
            run_id = %run_id,
            site = %self.site(),
            config_hash = self.config_hash.as_deref().unwrap_or("-"),
            discovery = self.profile.category_discovery.method(),
            pagination = self.profile.pagination.method(),
            extraction = self.profile.data_extraction.method(),
            "Starting full scrape"
        );

        let categories = self.discover_categories().await;
        let mut pages = self.collect_pages(&categories).await;
        fastrand::shuffle(&mut pages);
        info!(
            "{}: {} categories, {} listing pages",
            self.site(),
            categories.len(),
            pages.len()
        );

        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                self.pause().await;
            }
            self.check_page(page).await;
        }

        let stats = RunStats {
            pages_checked: self.stats.pages_checked - before.pages_checked,
            pages_failed: self.stats.pages_failed - before.pages_failed,
            records_seen: self.stats.records_seen - before.records_seen,
            records_new: self.stats.records_new - before.records_new,
            records_updated: self.stats.records_updated - before.records_updated,
            records_rejected: self.stats.records_rejected - before.records_rejected,
            drops_alerted: self.stats.drops_alerted - before.drops_alerted,
        };
        let summary = RunSummary {
            run_id,
            site: self.site().to_string(),
            pages: pages.len(),
            categories,
            stats,
            elapsed: started.elapsed(),
        };

        info!(
            run_id = %summary.run_id,
            pages = summary.pages,
            failed = summary.stats.pages_failed,
            new = summary.stats.records_new,
            updated = summary.stats.records_updated,
            alerts = summary.stats.drops_alerted,
            "Full scrape finished in {:.1}s",
            summary.elapsed.as_secs_f64()
        );
        summary
    }
}
