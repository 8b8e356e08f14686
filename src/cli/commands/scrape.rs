//! Full scrape, dry-run and profile test commands.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{Config, Settings};
use crate::scrapers::{
    CategoryDiscoverer, DocumentFormat, ExtractionDispatcher, PageFetcher, Paginator, SiteProfile,
};
use crate::services::{build_notifier, Orchestrator};

use super::helpers::{build_fetcher, load_profile, open_context, truncate};

/// Sample records printed by `test`.
const SAMPLE_RECORDS: usize = 3;

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb.set_message(message);
    pb
}

fn print_plan(profile: &SiteProfile) {
    println!("  {:<14} {}", "Base URL:", profile.base_url);
    println!("  {:<14} {}", "Discovery:", profile.category_discovery.method());
    println!("  {:<14} {}", "Pagination:", profile.pagination.method());
    println!("  {:<14} {}", "Extraction:", profile.data_extraction.method());
    let [min, max] = profile.request_config.delay_range;
    println!("  {:<14} {}-{}s", "Delay:", min, max);
}

/// Print what a run would do without touching the network or database.
pub fn cmd_dry_run(settings: &Settings, config: &Config, site: &str) -> anyhow::Result<()> {
    let profile = load_profile(config, site)?;

    println!(
        "{} Dry run for {} ({})",
        style("→").cyan(),
        style(&profile.name).bold(),
        site
    );
    print_plan(&profile);
    println!("  {:<14} {}", "Database:", settings.database_url());
    println!("  {:<14} {}%", "Threshold:", settings.alert_threshold);
    println!("  {:<14} {}", "Config hash:", &config.hash()[..12]);
    Ok(())
}

/// Run one full scrape of a site.
pub async fn cmd_run(
    settings: &Settings,
    config: &Config,
    site: &str,
    threshold: Option<f64>,
) -> anyhow::Result<()> {
    let profile = load_profile(config, site)?;
    let ctx = open_context(settings).await?;
    let fetcher = build_fetcher(&profile)?;
    let notifier = build_notifier(&config.notify);
    let threshold = threshold.unwrap_or(settings.alert_threshold);

    println!(
        "{} Scraping {} (alert threshold {}%)",
        style("→").cyan(),
        style(&profile.name).bold(),
        threshold
    );

    let mut orchestrator = Orchestrator::new(profile, fetcher, &ctx, notifier, threshold)
        .with_config_hash(config.hash());
    let summary = orchestrator.run_full_scrape().await;

    println!(
        "{} {} categories, {} pages in {:.0}s",
        style("✓").green(),
        summary.categories.len(),
        summary.pages,
        summary.elapsed.as_secs_f64()
    );
    println!(
        "  {} new, {} cheaper, {} alerts, {} rejected",
        summary.stats.records_new,
        summary.stats.records_updated,
        summary.stats.drops_alerted,
        summary.stats.records_rejected
    );
    if summary.stats.pages_failed > 0 {
        println!(
            "  {} {} page(s) could not be checked",
            style("!").yellow(),
            summary.stats.pages_failed
        );
    }
    Ok(())
}

/// Extract the first listing page of the first category and show samples.
pub async fn cmd_test(config: &Config, site: &str) -> anyhow::Result<()> {
    let profile = load_profile(config, site)?;
    let fetcher = build_fetcher(&profile)?;

    println!(
        "{} Testing {} ({})",
        style("→").cyan(),
        style(&profile.name).bold(),
        site
    );
    print_plan(&profile);

    let pb = spinner(format!("Discovering categories for {}...", profile.name));
    let categories = CategoryDiscoverer::new(fetcher.as_ref(), &profile)
        .discover()
        .await;
    pb.finish_and_clear();

    println!(
        "{} Found {} categories",
        style("✓").green(),
        categories.len()
    );
    let Some(category) = categories.iter().next() else {
        println!("{} Nothing to test", style("✗").red());
        return Ok(());
    };
    for url in categories.iter().take(SAMPLE_RECORDS) {
        println!("  {}", style(truncate(url, 100)).dim());
    }

    let pb = spinner(format!("Paginating {}...", category));
    let pages = Paginator::new(fetcher.as_ref(), &profile)
        .paginate(category)
        .await;
    pb.finish_and_clear();
    println!("{} {} page(s) in first category", style("✓").green(), pages.len());

    let Some(first_page) = pages.first() else {
        println!("{} First category could not be fetched", style("✗").red());
        return Ok(());
    };

    let dispatcher = ExtractionDispatcher::new(&profile.data_extraction);
    let pb = spinner(format!("Extracting {}...", first_page));
    let fetched = fetcher.fetch(first_page, DocumentFormat::Html).await;
    pb.finish_and_clear();

    let doc = match fetched {
        Ok(doc) => doc,
        Err(e) => {
            println!(
                "{} Could not fetch {} ({}): {}",
                style("✗").red(),
                first_page,
                e.kind,
                e.message
            );
            return Ok(());
        }
    };
    let records = dispatcher.extract(&doc);

    if records.is_empty() {
        println!(
            "{} No products extracted with {}",
            style("✗").red(),
            dispatcher.strategy_name()
        );
        return Ok(());
    }
    println!(
        "{} {} products extracted with {}",
        style("✓").green(),
        records.len(),
        dispatcher.strategy_name()
    );
    for record in records.iter().take(SAMPLE_RECORDS) {
        println!("{}", serde_json::to_string_pretty(record)?);
    }
    Ok(())
}
