//! Site profile listing.

use console::style;

use crate::config::Config;

use super::helpers::truncate;

pub fn cmd_sites(config: &Config) -> anyhow::Result<()> {
    let summaries = config.site_summaries();
    if summaries.is_empty() {
        println!("{} No site profiles configured", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<20} {:<24} {:<16} {}",
        style("SITE").bold(),
        style("NAME").bold(),
        style("EXTRACTION").bold(),
        style("BASE URL").bold()
    );
    for summary in summaries {
        let valid = match config.profile(&summary.key) {
            Ok(_) => style("✓").green(),
            Err(_) => style("✗").red(),
        };
        println!(
            "{:<20} {:<24} {:<16} {} {}",
            truncate(&summary.key, 20),
            truncate(&summary.name, 24),
            summary.extraction,
            summary.base_url,
            valid
        );
    }

    if let Some(ref path) = config.source_path {
        println!("\n{}", style(format!("from {}", path.display())).dim());
    }
    Ok(())
}
