//! Statistics command.

use chrono::{Duration, Utc};
use console::style;

use crate::config::Settings;

use super::helpers::{format_number, open_context};

/// Show product counts, price ranges and recent history volume.
pub async fn cmd_stats(settings: &Settings, site: Option<&str>) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let products = ctx.products();
    let links = ctx.links();

    let total = products.count(site).await?;
    let summary = products.price_summary(site).await?;
    let recent = products
        .history_count_since(site, Utc::now() - Duration::days(7))
        .await?;
    let categories = links.count_categories(site).await?;
    let pages = links.count_pages(site).await?;

    let separator = "─".repeat(50);
    println!();
    println!(
        "{}",
        style(format!("pricewatch stats{}", site.map(|s| format!(" for {}", s)).unwrap_or_default()))
            .bold()
    );
    println!("{}", separator);
    println!("Database: {}", settings.database_url());
    println!();

    println!("{}", style("PRODUCTS").cyan().bold());
    println!("  {:<24} {:>12}", "Total:", format_number(total));
    if site.is_none() {
        for (name, count) in products.counts_by_site().await? {
            println!("  {:<24} {:>12}", format!("{}:", name), format_number(count));
        }
    }
    println!();

    println!("{}", style("PRICES").cyan().bold());
    match (summary.min, summary.max, summary.avg) {
        (Some(min), Some(max), Some(avg)) => {
            println!("  {:<24} {:>12}", "Lowest:", min.to_string());
            println!("  {:<24} {:>12}", "Highest:", max.to_string());
            println!("  {:<24} {:>12.2}", "Average:", avg);
        }
        _ => println!("  {}", style("no priced products yet").dim()),
    }
    println!();

    println!("{}", style("ACTIVITY").cyan().bold());
    println!(
        "  {:<24} {:>12}",
        "History (7 days):",
        format_number(recent)
    );
    println!("  {:<24} {:>12}", "Categories:", format_number(categories));
    println!("  {:<24} {:>12}", "Listing pages:", format_number(pages));

    Ok(())
}
