//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Crawl an ebook catalog and download its books.
///
/// Commands are run in order; each one works from what the previous ones
/// stored in the catalog database, and re-running any of them is safe.
#[derive(Parser, Debug)]
#[command(name = "ebook-dl")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Catalog database file [default: ebook-dl.db]
    #[arg(long = "db", value_name = "PATH", global = true)]
    pub database: Option<PathBuf>,

    /// Config file [default: $XDG_CONFIG_HOME/ebook-dl/config.toml]
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Directory for downloaded files [default: downloads]
    #[arg(short, long, value_name = "DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    /// Catalog site root URL
    #[arg(long, value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// User-Agent sent with catalog requests
    #[arg(long, value_name = "UA", global = true)]
    pub user_agent: Option<String>,

    /// Worker ceiling for a stage, e.g. `--workers download=20` (repeatable)
    #[arg(long = "workers", value_name = "STAGE=N", global = true)]
    pub workers: Vec<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Discover book profile pages (all books when no keyword is given)
    Search {
        /// Search keyword
        keyword: Option<String>,
    },
    /// Extract book details from stored profile pages
    CollectBookInfo,
    /// Resolve download tokens to resource URLs
    ResourceUrl,
    /// Download every resolved resource
    DownloadAll,
    /// Show catalog row counts
    Status,
}
