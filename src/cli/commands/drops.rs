//! Price drop report.

use chrono::{Duration, Utc};
use console::style;

use crate::config::{Config, Settings};

use super::helpers::{format_price, open_context, truncate};

pub async fn cmd_drops(
    settings: &Settings,
    config: &Config,
    site: Option<&str>,
    days: i64,
    min_percent: f64,
    json: bool,
) -> anyhow::Result<()> {
    if days < 0 {
        anyhow::bail!("--days must be zero or positive");
    }
    let ctx = open_context(settings).await?;
    let since = Utc::now() - Duration::days(days);
    let drops = ctx
        .products()
        .recent_drops(site, since, min_percent)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&drops)?);
        return Ok(());
    }

    if drops.is_empty() {
        println!(
            "{} No price drops in the last {} day(s)",
            style("!").yellow(),
            days
        );
        return Ok(());
    }

    let currency = &config.notify.currency_symbol;
    println!(
        "{:<17} {:<12} {:<36} {:>10} {:>10} {:>7}",
        style("WHEN").bold(),
        style("SITE").bold(),
        style("PRODUCT").bold(),
        style("WAS").bold(),
        style("NOW").bold(),
        style("DROP").bold()
    );
    for drop in &drops {
        let name = if drop.name.is_empty() {
            &drop.product_id
        } else {
            &drop.name
        };
        println!(
            "{:<17} {:<12} {:<36} {:>10} {:>10} {:>6.1}%",
            drop.recorded_at.format("%Y-%m-%d %H:%M"),
            truncate(&drop.site, 12),
            truncate(name, 36),
            format_price(currency, drop.old_price),
            style(format_price(currency, drop.new_price)).green(),
            drop.percent_decrease
        );
    }
    println!("\n{} drop(s)", drops.len());
    Ok(())
}
