//! Command-line interface definitions for Sector News.
//!
//! This module defines the CLI arguments and subcommands using the `clap` crate.
//! Global options can also be provided via environment variables.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Sector News application.
///
/// # Examples
///
/// ```sh
/// # Full sweep over every configured sector and stock
/// sector_news batch --start 2025-05-01 --end 2025-05-07
///
/// # Quick scrape for one stock on two domains
/// sector_news scrape --target Infosys --domain moneycontrol.com --domain livemint.com
///
/// # Analyze a sector and two of its stocks over the last week
/// sector_news analyze --sector "Nifty IT" --stock Infosys --stock TCS -o ./reports
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, env = "SECTOR_NEWS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path (overrides `storage.database_path`)
    #[arg(long, env = "SECTOR_NEWS_DB", global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape every configured sector and stock across all configured domains
    Batch {
        /// First day of the window (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// Last day of the window (YYYY-MM-DD); clamped to today
        #[arg(long)]
        end: String,
    },

    /// Scrape one sector or stock over a short list of domains
    Scrape {
        /// Sector or stock name; unknown names are searched as a stock
        #[arg(short, long)]
        target: String,

        /// Sector tag for a stock that is not in the config
        #[arg(long)]
        sector: Option<String>,

        /// Domain to search (repeatable); defaults to the first configured domains
        #[arg(long = "domain")]
        domains: Vec<String>,

        /// Days to look back from the end date
        #[arg(long)]
        lookback: Option<u32>,

        /// Last day of the window (YYYY-MM-DD); defaults to today
        #[arg(long)]
        end: Option<String>,
    },

    /// Analyze stored articles for a sector and optionally some of its stocks
    Analyze {
        /// Configured sector name
        #[arg(short, long)]
        sector: String,

        /// Stock to analyze alongside the sector (repeatable)
        #[arg(long = "stock")]
        stocks: Vec<String>,

        /// Days to look back from the end date
        #[arg(long)]
        lookback: Option<u32>,

        /// Last day of the window (YYYY-MM-DD); defaults to today
        #[arg(long)]
        end: Option<String>,

        /// Articles sent to the LLM per target
        #[arg(long)]
        max_articles: Option<usize>,

        /// Extra instructions appended to the LLM prompt
        #[arg(long)]
        prompt: Option<String>,

        /// Output directory for the JSON report
        #[arg(short, long)]
        output_dir: PathBuf,
    },
}
