//! Continuous price monitoring.
//!
//! Repeatedly checks the first page of a random known category, with a
//! periodic full rediscovery, until the shutdown future resolves.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::bail;
use serde::Serialize;
use tracing::{info, warn};

use super::orchestrator::Orchestrator;

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// Run a full scrape when this much time has passed since the last one.
    pub refresh_every: Option<Duration>,
    /// Stop after this many checks.
    pub max_iterations: Option<usize>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(60),
            max_interval: Duration::from_secs(300),
            refresh_every: None,
            max_iterations: None,
        }
    }
}

impl MonitorOptions {
    fn sample_interval(&self) -> Duration {
        let min = self.min_interval.as_secs_f64();
        let max = self.max_interval.as_secs_f64().max(min);
        Duration::try_from_secs_f64(min + fastrand::f64() * (max - min)).unwrap_or(self.max_interval)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStats {
    pub checks: usize,
    pub failed_checks: usize,
    pub products_seen: usize,
    pub new_products: usize,
    pub price_drops: usize,
    pub alerts: usize,
    pub full_scrapes: usize,
}

impl MonitorStats {
    fn log(&self, elapsed: Duration) {
        info!(
            checks = self.checks,
            failed = self.failed_checks,
            seen = self.products_seen,
            new = self.new_products,
            drops = self.price_drops,
            alerts = self.alerts,
            full_scrapes = self.full_scrapes,
            "Monitoring for {:.0} min",
            elapsed.as_secs_f64() / 60.0
        );
    }
}

/// Monitor one site until `shutdown` resolves or the iteration limit is hit.
pub async fn monitor<F>(
    orchestrator: &mut Orchestrator,
    options: &MonitorOptions,
    shutdown: F,
) -> anyhow::Result<MonitorStats>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut categories = orchestrator.discover_categories().await;
    if categories.is_empty() {
        categories = orchestrator.known_categories().await;
    }
    if categories.is_empty() {
        bail!("No categories found for {}", orchestrator.site());
    }
    info!(
        "Monitoring {} ({} categories, threshold {}%)",
        orchestrator.site(),
        categories.len(),
        orchestrator.threshold_percent()
    );

    let started = Instant::now();
    let mut last_refresh = Instant::now();
    let mut stats = MonitorStats::default();

    loop {
        if options.max_iterations.is_some_and(|max| stats.checks >= max) {
            break;
        }

        let step = async {
            if options
                .refresh_every
                .is_some_and(|every| last_refresh.elapsed() >= every)
            {
                info!("Refreshing categories for {}", orchestrator.site());
                let summary = orchestrator.run_full_scrape().await;
                stats.full_scrapes += 1;
                stats.alerts += summary.stats.drops_alerted;
                last_refresh = Instant::now();
                if summary.categories.is_empty() {
                    warn!("Rediscovery found no categories; keeping the previous list");
                } else {
                    categories = summary.categories;
                }
            }

            let category = &categories[fastrand::usize(..categories.len())];
            stats.checks += 1;
            match orchestrator.check_page(category).await {
                Some(outcome) => {
                    stats.products_seen += outcome.seen();
                    stats.new_products += outcome.inserted;
                    stats.price_drops += outcome.updated;
                    stats.alerts += outcome.change_events.len();
                }
                None => stats.failed_checks += 1,
            }

            if stats.checks % 10 == 0 {
                stats.log(started.elapsed());
            }
        };

        tokio::select! {
            _ = &mut shutdown => break,
            _ = step => {}
        }

        if options.max_iterations.is_some_and(|max| stats.checks >= max) {
            break;
        }

        let pause = options.sample_interval();
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    info!("Monitoring of {} stopped", orchestrator.site());
    stats.log(started.elapsed());
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::repository::DieselDbContext;
    use crate::scrapers::fetcher::testing::StaticFetcher;
    use crate::scrapers::SiteProfile;
    use crate::services::notify::testing::RecordingNotifier;
    use tempfile::tempdir;

    fn profile() -> SiteProfile {
        serde_json::from_value(serde_json::json!({
            "name": "shop",
            "base_url": "https://shop.example/",
            "category_discovery": {"method": "href_pattern", "patterns": ["/c/"]},
            "data_extraction": {
                "method": "dom_scraping",
                "product_selector": ".card",
                "fields": {
                    "id": {"selector": "self", "attribute": "data-id"},
                    "price": {"selector": ".price"}
                }
            },
            "request_config": {"delay_range": [0, 0]}
        }))
        .unwrap()
    }

    fn instant() -> MonitorOptions {
        MonitorOptions {
            min_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            refresh_every: None,
            max_iterations: Some(3),
        }
    }

    #[tokio::test]
    async fn test_monitor_runs_iterations() {
        let dir = tempdir().unwrap();
        let ctx = DieselDbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();

        let fetcher = StaticFetcher::new()
            .page("https://shop.example/", r#"<a href="/c/all">All</a>"#)
            .page(
                "https://shop.example/c/all",
                r#"<div class="card" data-id="p1"><span class="price">£3.00</span></div>"#,
            );
        let mut orchestrator = Orchestrator::new(
            profile(),
            Arc::new(fetcher),
            &ctx,
            Arc::new(RecordingNotifier::default()),
            10.0,
        );

        let stats = monitor(&mut orchestrator, &instant(), std::future::pending())
            .await
            .unwrap();

        assert_eq!(stats.checks, 3);
        assert_eq!(stats.new_products, 1);
        assert_eq!(stats.products_seen, 3);
        assert_eq!(stats.failed_checks, 0);
    }

    #[tokio::test]
    async fn test_monitor_without_categories_fails() {
        let dir = tempdir().unwrap();
        let ctx = DieselDbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();

        let mut orchestrator = Orchestrator::new(
            profile(),
            Arc::new(StaticFetcher::new()),
            &ctx,
            Arc::new(RecordingNotifier::default()),
            10.0,
        );

        let result = monitor(&mut orchestrator, &instant(), std::future::pending()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_monitor_falls_back_to_stored_categories() {
        let dir = tempdir().unwrap();
        let ctx = DieselDbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        ctx.links()
            .record_category("https://shop.example/c/saved", "shop", chrono::Utc::now())
            .await
            .unwrap();

        let fetcher = StaticFetcher::new().page(
            "https://shop.example/c/saved",
            r#"<div class="card" data-id="s1"><span class="price">£9.99</span></div>"#,
        );
        let mut orchestrator = Orchestrator::new(
            profile(),
            Arc::new(fetcher),
            &ctx,
            Arc::new(RecordingNotifier::default()),
            10.0,
        );

        let stats = monitor(&mut orchestrator, &instant(), std::future::pending())
            .await
            .unwrap();
        assert_eq!(stats.new_products, 1);
    }

    #[tokio::test]
    async fn test_monitor_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let ctx = DieselDbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();

        let fetcher = StaticFetcher::new()
            .page("https://shop.example/", r#"<a href="/c/all">All</a>"#)
            .page("https://shop.example/c/all", "<p>empty</p>");
        let mut orchestrator = Orchestrator::new(
            profile(),
            Arc::new(fetcher),
            &ctx,
            Arc::new(RecordingNotifier::default()),
            10.0,
        );
        let options = MonitorOptions {
            min_interval: Duration::from_secs(3600),
            max_interval: Duration::from_secs(3600),
            refresh_every: None,
            max_iterations: None,
        };

        let stats = monitor(
            &mut orchestrator,
            &options,
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await
        .unwrap();
        assert_eq!(stats.checks, 1);
    }
}
