//! Continuous monitoring command.

use std::time::Duration;

use console::style;

use crate::config::{Config, Settings};
use crate::services::{build_notifier, monitor, MonitorOptions, Orchestrator};

use super::helpers::{build_fetcher, load_profile, open_context};

/// One year.
const MAX_REFRESH_HOURS: f64 = 8_760.0;

pub struct MonitorArgs {
    pub min_interval: u64,
    pub max_interval: u64,
    pub threshold: f64,
    pub refresh_hours: f64,
    pub iterations: Option<usize>,
}

impl MonitorArgs {
    fn options(&self) -> anyhow::Result<MonitorOptions> {
        if self.min_interval > self.max_interval {
            anyhow::bail!(
                "--min-interval ({}) must not exceed --max-interval ({})",
                self.min_interval,
                self.max_interval
            );
        }
        if !(0.0..=MAX_REFRESH_HOURS).contains(&self.refresh_hours) {
            anyhow::bail!("--refresh-hours must be between 0 and {}", MAX_REFRESH_HOURS);
        }
        let refresh_every = if self.refresh_hours > 0.0 {
            Some(Duration::try_from_secs_f64(self.refresh_hours * 3600.0)?)
        } else {
            None
        };
        Ok(MonitorOptions {
            min_interval: Duration::from_secs(self.min_interval),
            max_interval: Duration::from_secs(self.max_interval),
            refresh_every,
            max_iterations: self.iterations,
        })
    }
}

/// Monitor a site until Ctrl-C.
pub async fn cmd_monitor(
    settings: &Settings,
    config: &Config,
    site: &str,
    args: MonitorArgs,
) -> anyhow::Result<()> {
    let options = args.options()?;
    let profile = load_profile(config, site)?;
    let ctx = open_context(settings).await?;
    let fetcher = build_fetcher(&profile)?;
    let notifier = build_notifier(&config.notify);

    println!(
        "{} Monitoring {} every {}-{}s, alerting on drops of {}% or more (Ctrl-C to stop)",
        style("→").cyan(),
        style(&profile.name).bold(),
        args.min_interval,
        args.max_interval,
        args.threshold
    );

    let mut orchestrator = Orchestrator::new(profile, fetcher, &ctx, notifier, args.threshold)
        .with_config_hash(config.hash());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let stats = monitor(&mut orchestrator, &options, shutdown).await?;

    println!(
        "\n{} Stopped after {} checks ({} failed)",
        style("✓").green(),
        stats.checks,
        stats.failed_checks
    );
    println!(
        "  {} products seen, {} new, {} cheaper, {} alerts, {} full scrapes",
        stats.products_seen,
        stats.new_products,
        stats.price_drops,
        stats.alerts,
        stats.full_scrapes
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(min: u64, max: u64, refresh: f64) -> MonitorArgs {
        MonitorArgs {
            min_interval: min,
            max_interval: max,
            threshold: 10.0,
            refresh_hours: refresh,
            iterations: None,
        }
    }

    #[test]
    fn test_monitor_args() {
        let options = args(60, 300, 0.0).options().unwrap();
        assert!(options.refresh_every.is_none());
        assert_eq!(options.max_interval, Duration::from_secs(300));

        let options = args(1, 1, 1.5).options().unwrap();
        assert_eq!(options.refresh_every, Some(Duration::from_secs(5400)));

        assert!(args(10, 5, 0.0).options().is_err());
        assert!(args(1, 5, -1.0).options().is_err());
        assert!(args(1, 5, f64::NAN).options().is_err());
        assert!(args(1, 5, 1e300).options().is_err());
    }
}
