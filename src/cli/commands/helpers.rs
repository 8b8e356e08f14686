//! Shared helper functions for CLI commands.

use std::sync::Arc;

use crate::config::{Config, Settings};
use crate::models::Price;
use crate::repository::DieselDbContext;
use crate::scrapers::{HttpClient, PageFetcher, SiteProfile};

/// Open the database, creating the data directory and schema if needed.
pub async fn open_context(settings: &Settings) -> anyhow::Result<DieselDbContext> {
    if settings.database_url.is_none() {
        settings.ensure_directories()?;
    }
    let ctx = settings.create_db_context();
    ctx.init_schema().await?;
    Ok(ctx)
}

/// Load a profile, naming the config file in the error.
pub fn load_profile(config: &Config, site: &str) -> anyhow::Result<SiteProfile> {
    config.profile(site).map_err(|e| match config.source_path {
        Some(ref path) => anyhow::anyhow!("{} ({})", e, path.display()),
        None => anyhow::anyhow!("{} (no config file found)", e),
    })
}

/// HTTP fetcher for a profile's request policy.
pub fn build_fetcher(profile: &SiteProfile) -> anyhow::Result<Arc<dyn PageFetcher>> {
    Ok(Arc::new(HttpClient::new(&profile.request_config)?))
}

/// Truncate a string to max characters with ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format a number with thousands separators.
pub fn format_number(n: i64) -> String {
    let s = n.unsigned_abs().to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();
    let chunks: Vec<_> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();
    let grouped = chunks.into_iter().rev().collect::<Vec<_>>().join(",");
    if n < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

pub fn format_price(currency: &str, price: Price) -> String {
    format!("{}{}", currency, price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long product name", 10), "a long ...");
        assert_eq!(truncate("café crème brûlée", 8), "café ...");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(-1000), "-1,000");
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price("£", Price::from_minor(1250)), "£12.50");
    }
}
