//! Initialize command.

use console::style;

use crate::config::{Config, Settings};

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings, config: &Config) -> anyhow::Result<()> {
    let ctx = super::helpers::open_context(settings).await?;
    let tables = ctx.list_tables().await?;

    println!(
        "{} Database ready at {} ({} tables)",
        style("✓").green(),
        settings.database_url(),
        tables.len()
    );

    if config.sites.is_empty() {
        println!("{} No site profiles configured", style("!").yellow());
        println!("  Create pricewatch.json with a \"sites\" map to get started");
    } else {
        for key in config.sites.keys() {
            println!("  {} {}", style("•").dim(), key);
        }
    }

    println!(
        "{} Initialized pricewatch in {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    Ok(())
}
