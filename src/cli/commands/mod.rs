//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod drops;
mod helpers;
mod init;
mod monitor;
mod scrape;
mod sites;
mod stats;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "pricewatch")]
#[command(about = "Track e-commerce prices from declarative site profiles")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "PRICEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory holding the database (overrides config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// List configured site profiles
    Sites,

    /// Run one full scrape of a site
    Run {
        /// Site profile key
        site: String,
        /// Print the plan without fetching anything
        #[arg(long)]
        dry_run: bool,
        /// Alert threshold in percent (defaults to the configured threshold)
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Try a profile against its first listing page without storing anything
    Test {
        /// Site profile key
        site: String,
    },

    /// Keep checking random categories for price drops
    Monitor {
        /// Site profile key
        site: String,
        /// Minimum pause between checks, in seconds
        #[arg(long, default_value = "60")]
        min_interval: u64,
        /// Maximum pause between checks, in seconds
        #[arg(long, default_value = "300")]
        max_interval: u64,
        /// Alert threshold in percent
        #[arg(short, long, default_value = "10")]
        threshold: f64,
        /// Run a full scrape every N hours (0 = never)
        #[arg(long, default_value = "0")]
        refresh_hours: f64,
        /// Stop after this many checks
        #[arg(long)]
        iterations: Option<usize>,
    },

    /// Show product and price history statistics
    Stats {
        /// Limit to one site
        site: Option<String>,
    },

    /// Report recent price drops
    Drops {
        /// Limit to one site
        site: Option<String>,
        /// How many days back to look
        #[arg(short, long, default_value = "7")]
        days: i64,
        /// Only show drops of at least this percentage
        #[arg(long, default_value = "0")]
        min_percent: f64,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
    };
    let (settings, config) = load_settings_with_options(options).await?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings, &config).await,
        Commands::Sites => sites::cmd_sites(&config),
        Commands::Run {
            site,
            dry_run,
            threshold,
        } => {
            if dry_run {
                scrape::cmd_dry_run(&settings, &config, &site)
            } else {
                scrape::cmd_run(&settings, &config, &site, threshold).await
            }
        }
        Commands::Test { site } => scrape::cmd_test(&config, &site).await,
        Commands::Monitor {
            site,
            min_interval,
            max_interval,
            threshold,
            refresh_hours,
            iterations,
        } => {
            monitor::cmd_monitor(
                &settings,
                &config,
                &site,
                monitor::MonitorArgs {
                    min_interval,
                    max_interval,
                    threshold,
                    refresh_hours,
                    iterations,
                },
            )
            .await
        }
        Commands::Stats { site } => stats::cmd_stats(&settings, site.as_deref()).await,
        Commands::Drops {
            site,
            days,
            min_percent,
            json,
        } => drops::cmd_drops(&settings, &config, site.as_deref(), days, min_percent, json).await,
    }
}
