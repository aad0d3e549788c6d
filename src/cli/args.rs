//! CLI argument definitions using clap
//!
//! Commands:
//! - katamari start [--config <path>] [--addr <host:port>] [--force-patch] [--data-dir <path>]
//! - katamari verify --data-dir <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Katamari - a real-time key-addressed document store
#[derive(Parser, Debug)]
#[command(name = "katamari")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Start the server and block until shutdown
    Start {
        /// Path to a JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Address to listen on (host:port)
        #[arg(long)]
        addr: Option<String>,

        /// Merge full-document writes into stored documents
        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        force_patch: Option<bool>,

        /// Journal directory; omit to keep data in memory only
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Replay a journal and report what it contains
    Verify {
        /// Journal directory
        #[arg(long)]
        data_dir: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
