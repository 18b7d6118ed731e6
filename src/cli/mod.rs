//! CLI module for Kilns.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Kilns - Caption Archive Search
///
/// A local-first CLI tool for storing scraped YouTube caption tracks and
/// searching them with ranked, timestamp-accurate results. Named after The
/// Kilns, C.S. Lewis's home outside Oxford.
#[derive(Parser, Debug)]
#[command(name = "kilns")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Kilns and create the caption database
    Init,

    /// Ingest scraped caption data from a JSON file
    Ingest {
        /// Path to a scrape file (one bundle or an array of bundles)
        file: String,
    },

    /// Search the caption archive
    Search {
        /// Search query
        query: String,

        /// Maximum number of results (up to the configured cap)
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Emit results as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// List stored videos
    List,

    /// Export one video's captions as readable text
    Export {
        /// Video ID to export
        video_id: String,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Delete a video and its captions from the archive
    Purge {
        /// Video ID to delete
        video_id: String,
    },

    /// Show archive statistics
    Stats,

    /// Start HTTP API server for integration with other systems
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
